pub mod once;
pub mod relay;
pub mod watch;

// Re-export command functions for convenience
pub use once::once;
pub use relay::relay;
pub use watch::watch;

/// Resolve when Ctrl+C is received
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}
