use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, QueryableByName)]
#[diesel(table_name = crate::schema::earnings)]
#[diesel(check_for_backend(diesel::mysql::Mysql))]
pub struct Earning {
    pub id: i32,
    pub miner_id: i32,
    pub pool_id: i32,
    pub challenge_id: i32,
    pub amount: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, QueryableByName, Insertable)]
#[diesel(table_name = crate::schema::earnings)]
#[diesel(check_for_backend(diesel::mysql::Mysql))]
pub struct InsertEarning {
    pub miner_id: i32,
    pub pool_id: i32,
    pub challenge_id: i32,
    pub amount: u64,
}

impl InsertEarning {
    /// Omitted amounts follow the column default of 0.
    pub fn new(miner_id: i32, pool_id: i32, challenge_id: i32, amount: Option<u64>) -> Self {
        InsertEarning {
            miner_id,
            pool_id,
            challenge_id,
            amount: amount.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, QueryableByName)]
#[diesel(table_name = crate::schema::earnings)]
#[diesel(check_for_backend(diesel::mysql::Mysql))]
pub struct UpdateEarningAmount {
    pub id: i32,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize, QueryableByName)]
pub struct EarningTotal {
    #[diesel(sql_type = diesel::sql_types::Unsigned<diesel::sql_types::BigInt>)]
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_earning_defaults_amount_to_zero() {
        let earning = InsertEarning::new(1, 1, 1, None);
        assert_eq!(earning.amount, 0);
    }

    #[test]
    fn insert_earning_keeps_supplied_amount() {
        let earning = InsertEarning::new(1, 1, 1, Some(500));
        assert_eq!(earning.amount, 500);
    }
}
