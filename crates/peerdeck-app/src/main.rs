//! Process entry point.

use peerdeck_app::{bootstrap, AppError};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    bootstrap::run().await
}
