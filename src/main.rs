//! Streaming iso-surface voxel world renderer.
//!
//! Entry point that delegates to the app module.

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("starting isoterra");
    isoterra::app::run();
}
