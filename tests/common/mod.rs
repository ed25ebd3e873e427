#![allow(dead_code)]

/// Runs `future` inside a `LocalSet` so streams can be spawned with
/// `tokio::task::spawn_local` under either feature.
pub fn local_test<F: Future<Output = ()>>(future: F) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime");
    tokio::task::LocalSet::new().block_on(&runtime, future);
}

/// Gives spawned driver tasks a chance to run until they go idle.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
