// weirpool - buffered async resource pool
// This is just a binary wrapper - the actual library is in lib.rs

use std::sync::atomic::{AtomicUsize, Ordering};

use weirpool::{Pool, PoolConfig};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

#[tokio::main]
async fn main() {
    println!("=== weirpool demo ===");

    let pool = Pool::new(
        || async { Ok(format!("conn-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))) },
        |conn: String| async move {
            drop(conn);
            Ok(())
        },
        PoolConfig::new().with_max(4).with_min(1),
    )
    .await;

    println!("buffered after start: {}", pool.size());

    let conn = pool.get().await;
    println!("got: {conn}");
    pool.put(conn).await.expect("returned connection is unique");

    pool.drain().await;
    println!("after drain: {}", pool.size());
}
