use deadpool_diesel::mysql::{Manager, Pool};
use diesel::{
    insert_into,
    sql_types::{BigInt, Integer, Unsigned},
    MysqlConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::time::Instant;
use tracing::{error, info};

use crate::models::{self, Earning, EarningTotal};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[derive(Debug)]
pub enum AppDatabaseError {
    FailedToGetConnectionFromPool,
    EntityDoesNotExist,
    FailedToUpdateRow,
    FailedToInsertRow,
    InteractionFailed,
    QueryFailed,
}

pub struct AppDatabase {
    connection_pool: Pool,
}

impl AppDatabase {
    pub fn new(url: String) -> Self {
        let manager = Manager::new(url, deadpool_diesel::Runtime::Tokio1);

        let pool = Pool::builder(manager).build().unwrap();

        AppDatabase {
            connection_pool: pool,
        }
    }

    pub async fn run_migrations(&self) -> Result<(), AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    conn.run_pending_migrations(MIGRATIONS)
                        .map(|versions| versions.len())
                        .map_err(|e| e.to_string())
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(applied) => {
                        info!("Applied {} pending migrations", applied);
                        return Ok(());
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn add_new_earning(
        &self,
        earning: models::InsertEarning,
    ) -> Result<(), AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn.interact(move |conn: &mut MysqlConnection| {
                diesel::sql_query("INSERT INTO earnings (miner_id, pool_id, challenge_id, amount) VALUES (?, ?, ?, ?)")
                .bind::<Integer, _>(earning.miner_id)
                .bind::<Integer, _>(earning.pool_id)
                .bind::<Integer, _>(earning.challenge_id)
                .bind::<Unsigned<BigInt>, _>(earning.amount)
                .execute(conn)
            }).await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(query) => {
                        if query != 1 {
                            return Err(AppDatabaseError::FailedToInsertRow);
                        }
                        return Ok(());
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn add_new_earnings_batch(
        &self,
        earnings: Vec<models::InsertEarning>,
    ) -> Result<(), AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    insert_into(crate::schema::earnings::dsl::earnings)
                        .values(&earnings)
                        .execute(conn)
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(query) => {
                        info!("Earnings inserted: {}", query);
                        if query == 0 {
                            return Err(AppDatabaseError::FailedToInsertRow);
                        }
                        return Ok(());
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn get_earning_by_id(&self, earning_id: i32) -> Result<Earning, AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    diesel::sql_query("SELECT id, miner_id, pool_id, challenge_id, amount, created_at, updated_at FROM earnings WHERE earnings.id = ?")
                        .bind::<Integer, _>(earning_id)
                        .get_result::<Earning>(conn)
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(query) => {
                        return Ok(query);
                    }
                    Err(diesel::result::Error::NotFound) => {
                        return Err(AppDatabaseError::EntityDoesNotExist);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn get_earnings_for_miner(
        &self,
        miner_id: i32,
        last_id: i32,
    ) -> Result<Vec<Earning>, AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    diesel::sql_query("SELECT * FROM earnings e WHERE e.miner_id = ? AND e.id > ? ORDER BY e.id ASC LIMIT 500")
                        .bind::<Integer, _>(miner_id)
                        .bind::<Integer, _>(last_id)
                        .load::<Earning>(conn)
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(query) => {
                        return Ok(query);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn get_earnings_for_pool(
        &self,
        pool_id: i32,
        last_id: i32,
    ) -> Result<Vec<Earning>, AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    diesel::sql_query("SELECT * FROM earnings e WHERE e.pool_id = ? AND e.id > ? ORDER BY e.id ASC LIMIT 500")
                        .bind::<Integer, _>(pool_id)
                        .bind::<Integer, _>(last_id)
                        .load::<Earning>(conn)
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(query) => {
                        return Ok(query);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn get_earnings_for_challenge(
        &self,
        challenge_id: i32,
    ) -> Result<Vec<Earning>, AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    diesel::sql_query(
                        "SELECT * FROM earnings e WHERE e.challenge_id = ? ORDER BY e.id ASC",
                    )
                    .bind::<Integer, _>(challenge_id)
                    .load::<Earning>(conn)
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(query) => {
                        return Ok(query);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn update_earning_amount(
        &self,
        earning_id: i32,
        amount: u64,
    ) -> Result<(), AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    diesel::sql_query("UPDATE earnings SET amount = ? WHERE id = ?")
                        .bind::<Unsigned<BigInt>, _>(amount)
                        .bind::<Integer, _>(earning_id)
                        .execute(conn)
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(query) => {
                        if query != 1 {
                            return Err(AppDatabaseError::FailedToUpdateRow);
                        }
                        return Ok(());
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn update_earnings_amounts_batch(
        &self,
        earnings: Vec<models::UpdateEarningAmount>,
    ) -> Result<(), AppDatabaseError> {
        let id = uuid::Uuid::new_v4();
        let instant = Instant::now();
        tracing::info!("{} - Getting db pool connection.", id);
        if let Ok(db_conn) = self.connection_pool.get().await {
            tracing::info!(
                "{} - Got db pool connection in {}ms.",
                id,
                instant.elapsed().as_millis()
            );
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    let query = diesel::sql_query(build_amounts_update_sql(&earnings));
                    query.execute(conn)
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(_query) => {
                        return Ok(());
                    }
                    Err(e) => {
                        error!("{} - update earnings query error: {:?}", id, e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{} - update earnings interaction error: {:?}", id, e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn get_miner_total_earnings(
        &self,
        miner_id: i32,
    ) -> Result<u64, AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    diesel::sql_query("SELECT CAST(COALESCE(SUM(amount), 0) AS UNSIGNED) AS total FROM earnings WHERE miner_id = ?")
                        .bind::<Integer, _>(miner_id)
                        .get_result::<EarningTotal>(conn)
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(query) => {
                        return Ok(query.total);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }

    pub async fn delete_old_earnings(&self) -> Result<(), AppDatabaseError> {
        if let Ok(db_conn) = self.connection_pool.get().await {
            let res = db_conn
                .interact(move |conn: &mut MysqlConnection| {
                    diesel::sql_query("DELETE FROM earnings WHERE created_at < NOW() - INTERVAL 7 DAY LIMIT 100000")
                        .execute(conn)
                })
                .await;

            match res {
                Ok(interaction) => match interaction {
                    Ok(_query) => {
                        return Ok(());
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        return Err(AppDatabaseError::QueryFailed);
                    }
                },
                Err(e) => {
                    error!("{:?}", e);
                    return Err(AppDatabaseError::InteractionFailed);
                }
            }
        } else {
            return Err(AppDatabaseError::FailedToGetConnectionFromPool);
        };
    }
}

/// Single-statement CASE update setting each row's amount by id.
/// `earnings` must be non-empty; ids and amounts are integers, so the
/// interpolation stays injection-safe.
pub fn build_amounts_update_sql(earnings: &[models::UpdateEarningAmount]) -> String {
    "UPDATE earnings SET amount = CASE id ".to_string()
        + &earnings
            .iter()
            .map(|e| format!("WHEN {} THEN {}", e.id, e.amount))
            .collect::<Vec<_>>()
            .join(" ")
        + " END WHERE id IN ("
        + &earnings
            .iter()
            .map(|e| e.id.to_string())
            .collect::<Vec<_>>()
            .join(",")
        + ")"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpdateEarningAmount;

    #[test]
    fn amounts_update_sql_single_row() {
        let sql = build_amounts_update_sql(&[UpdateEarningAmount { id: 7, amount: 750 }]);
        assert_eq!(
            sql,
            "UPDATE earnings SET amount = CASE id WHEN 7 THEN 750 END WHERE id IN (7)"
        );
    }

    #[test]
    fn amounts_update_sql_multiple_rows() {
        let sql = build_amounts_update_sql(&[
            UpdateEarningAmount { id: 1, amount: 500 },
            UpdateEarningAmount { id: 2, amount: 0 },
        ]);
        assert_eq!(
            sql,
            "UPDATE earnings SET amount = CASE id WHEN 1 THEN 500 WHEN 2 THEN 0 END WHERE id IN (1,2)"
        );
    }

    #[test]
    fn amounts_update_sql_handles_max_u64() {
        let sql = build_amounts_update_sql(&[UpdateEarningAmount {
            id: 3,
            amount: u64::MAX,
        }]);
        assert!(sql.contains(&u64::MAX.to_string()));
    }
}
