use std::{path::Path, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tokio::{io::AsyncReadExt, time::Instant};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use earnings_ledger::{
    app_database::{AppDatabase, AppDatabaseError},
    models::{InsertEarning, UpdateEarningAmount},
    systems::db_cleanup_system::db_cleanup_system,
};

const BATCH_SIZE: usize = 200;

#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Run migrations, then keep the maintenance systems running
    Run,
    /// Insert a single earning record
    Add {
        #[arg(long, value_name = "miner id", help = "Miner the reward is attributed to")]
        miner_id: i32,
        #[arg(long, value_name = "pool id", help = "Pool the reward was earned through")]
        pool_id: i32,
        #[arg(long, value_name = "challenge id", help = "Challenge round the reward was earned for")]
        challenge_id: i32,
        #[arg(
            long,
            value_name = "amount",
            help = "Reward amount in base units",
            default_value = None
        )]
        amount: Option<u64>,
    },
    /// Set the amount of an existing earning record
    Update {
        #[arg(long, value_name = "earning id")]
        id: i32,
        #[arg(long, value_name = "amount")]
        amount: u64,
    },
    /// Print one earning record as JSON
    Get {
        #[arg(long, value_name = "earning id")]
        id: i32,
    },
    /// Print earning records matching a miner, pool, or challenge as JSON
    List {
        #[arg(long, value_name = "miner id", default_value = None)]
        miner_id: Option<i32>,
        #[arg(long, value_name = "pool id", default_value = None)]
        pool_id: Option<i32>,
        #[arg(long, value_name = "challenge id", default_value = None)]
        challenge_id: Option<i32>,
        #[arg(
            long,
            value_name = "last id",
            help = "Resume paging after this record id",
            default_value = "0"
        )]
        last_id: i32,
    },
    /// Print the sum of a miner's earnings
    Total {
        #[arg(long, value_name = "miner id")]
        miner_id: i32,
    },
    /// Delete earnings past the retention window, once
    Prune,
    /// Bulk-insert earnings from a JSON file of records
    Settle {
        #[arg(long, value_name = "path", help = "JSON array of earning records to insert")]
        file: String,
    },
    /// Bulk-update amounts from a JSON file of {id, amount} pairs
    Adjust {
        #[arg(long, value_name = "path", help = "JSON array of amount adjustments")]
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let file_appender = tracing_appender::rolling::daily("./logs", "earnings-ledger.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "earnings_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    // load envs
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set.");

    let app_database = Arc::new(AppDatabase::new(database_url));

    match args.command {
        Commands::Migrate => {
            if app_database.run_migrations().await.is_err() {
                return Err("Failed to run migrations".into());
            }
            println!("Migrations are up to date");
        }
        Commands::Run => {
            if app_database.run_migrations().await.is_err() {
                return Err("Failed to run migrations".into());
            }

            let app_db = app_database.clone();
            tokio::spawn(async move {
                db_cleanup_system(app_db).await;
            });

            info!("Earnings ledger maintenance running. Ctrl-C to stop.");
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
        }
        Commands::Add {
            miner_id,
            pool_id,
            challenge_id,
            amount,
        } => {
            let new_earning = InsertEarning::new(miner_id, pool_id, challenge_id, amount);
            if let Err(e) = app_database.add_new_earning(new_earning).await {
                error!("Failed to insert earning. E: {:?}", e);
                return Err("Failed to insert earning".into());
            }
            println!("Inserted earning for miner {}", miner_id);
        }
        Commands::Update { id, amount } => {
            match app_database.update_earning_amount(id, amount).await {
                Ok(_) => {
                    println!("Updated earning {}", id);
                }
                Err(AppDatabaseError::FailedToUpdateRow) => {
                    return Err(format!("No earning with id {}", id).into());
                }
                Err(e) => {
                    error!("Failed to update earning. E: {:?}", e);
                    return Err("Failed to update earning".into());
                }
            }
        }
        Commands::Get { id } => match app_database.get_earning_by_id(id).await {
            Ok(earning) => {
                println!("{}", serde_json::to_string_pretty(&earning)?);
            }
            Err(AppDatabaseError::EntityDoesNotExist) => {
                return Err(format!("No earning with id {}", id).into());
            }
            Err(e) => {
                error!("Failed to get earning. E: {:?}", e);
                return Err("Failed to get earning".into());
            }
        },
        Commands::List {
            miner_id,
            pool_id,
            challenge_id,
            last_id,
        } => {
            let earnings = if let Some(miner_id) = miner_id {
                app_database.get_earnings_for_miner(miner_id, last_id).await
            } else if let Some(pool_id) = pool_id {
                app_database.get_earnings_for_pool(pool_id, last_id).await
            } else if let Some(challenge_id) = challenge_id {
                app_database.get_earnings_for_challenge(challenge_id).await
            } else {
                return Err("Provide one of --miner-id, --pool-id or --challenge-id".into());
            };

            match earnings {
                Ok(earnings) => {
                    println!("{}", serde_json::to_string_pretty(&earnings)?);
                }
                Err(e) => {
                    error!("Failed to list earnings. E: {:?}", e);
                    return Err("Failed to list earnings".into());
                }
            }
        }
        Commands::Total { miner_id } => {
            match app_database.get_miner_total_earnings(miner_id).await {
                Ok(total) => {
                    println!("{}", total);
                }
                Err(e) => {
                    error!("Failed to total earnings. E: {:?}", e);
                    return Err("Failed to total earnings".into());
                }
            }
        }
        Commands::Prune => {
            if app_database.delete_old_earnings().await.is_err() {
                return Err("Failed to prune old earnings".into());
            }
            println!("Pruned old earnings");
        }
        Commands::Settle { file } => {
            let new_earnings: Vec<InsertEarning> = read_json_file(&file).await?;
            info!("Adding {} earnings", new_earnings.len());
            let instant = Instant::now();
            for (i, batch) in new_earnings.chunks(BATCH_SIZE).enumerate() {
                while let Err(_) = app_database.add_new_earnings_batch(batch.to_vec()).await {
                    error!("Failed to add new earnings batch to db. Retrying...");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                info!("Inserted earnings batch {}", i);
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            info!("Added earnings in {}ms", instant.elapsed().as_millis());
            println!("Inserted {} earnings", new_earnings.len());
        }
        Commands::Adjust { file } => {
            let adjustments: Vec<UpdateEarningAmount> = read_json_file(&file).await?;
            info!("Adjusting {} earnings", adjustments.len());
            let instant = Instant::now();
            for (i, batch) in adjustments.chunks(BATCH_SIZE).enumerate() {
                while let Err(_) = app_database
                    .update_earnings_amounts_batch(batch.to_vec())
                    .await
                {
                    error!("Failed to update earnings batch in db. Retrying...");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                info!("Updated earnings batch {}", i);
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            info!("Adjusted earnings in {}ms", instant.elapsed().as_millis());
            println!("Adjusted {} earnings", adjustments.len());
        }
    }

    Ok(())
}

async fn read_json_file<T: serde::de::DeserializeOwned>(
    path: &str,
) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    let file = Path::new(path);
    if !file.exists() {
        return Err(format!("File doesn't exist at: {}", path).into());
    }

    let mut contents = String::new();
    let mut file = tokio::fs::File::open(file).await?;
    file.read_to_string(&mut contents).await?;

    Ok(serde_json::from_str(&contents)?)
}
