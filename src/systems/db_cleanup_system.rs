use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{error, info};

use crate::app_database::AppDatabase;

const DB_CLEANUP_INTERVAL: u64 = 3600;

/// Hourly prune of earnings past the retention window.
pub async fn db_cleanup_system(app_database: Arc<AppDatabase>) {
    loop {
        let instant = Instant::now();
        match app_database.delete_old_earnings().await {
            Ok(_) => {
                info!(
                    "Pruned old earnings in {}ms",
                    instant.elapsed().as_millis()
                );
            }
            Err(e) => {
                error!("Failed to prune old earnings. E: {:?}", e);
            }
        }

        tokio::time::sleep(Duration::from_secs(DB_CLEANUP_INTERVAL)).await;
    }
}
