use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::db::DbPool;
use shared::{BalanceChange, CheckoutError, Result, UserAccount};

use crate::models::{AccountRow, NewAccount, NewPayment};
use crate::schema::{accounts, payments};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCharge {
    Charged(UserAccount),
    AlreadyCharged,
}

#[async_trait]
pub trait AccountRepo: Send + Sync {
    /// Opens a zero-balance account. Returns `false` when the user already
    /// has one.
    async fn open(&self, user_id: i64) -> Result<bool>;

    async fn get(&self, user_id: i64) -> Result<UserAccount>;

    /// Applies `change` with the account row locked for the duration.
    async fn change_balance(&self, user_id: i64, change: BalanceChange) -> Result<UserAccount>;

    /// Withdraws the price of `order_id` at most once. The payment record is
    /// written in the same transaction as the balance change.
    async fn charge_order(&self, user_id: i64, order_id: i64, amount: i64) -> Result<OrderCharge>;
}

pub struct PgAccountRepo {
    pool: DbPool,
}

impl PgAccountRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn missing(user_id: i64) -> CheckoutError {
    CheckoutError::NotFound(format!("account of user {user_id}"))
}

async fn lock_account(conn: &mut AsyncPgConnection, user_id: i64) -> Result<AccountRow> {
    accounts::table
        .filter(accounts::user_id.eq(user_id))
        .select(AccountRow::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| missing(user_id))
}

async fn store_balance(conn: &mut AsyncPgConnection, id: i64, balance: i64) -> Result<UserAccount> {
    let updated = diesel::update(accounts::table.find(id))
        .set((
            accounts::balance.eq(balance),
            accounts::updated_at.eq(Utc::now()),
        ))
        .returning(AccountRow::as_returning())
        .get_result(conn)
        .await?;

    Ok(UserAccount::from(updated))
}

#[async_trait]
impl AccountRepo for PgAccountRepo {
    async fn open(&self, user_id: i64) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let inserted = diesel::insert_into(accounts::table)
            .values(&NewAccount { user_id, balance: 0 })
            .on_conflict(accounts::user_id)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(inserted == 1)
    }

    async fn get(&self, user_id: i64) -> Result<UserAccount> {
        let mut conn = self.pool.get().await?;

        accounts::table
            .filter(accounts::user_id.eq(user_id))
            .select(AccountRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(UserAccount::from)
            .ok_or_else(|| missing(user_id))
    }

    async fn change_balance(&self, user_id: i64, change: BalanceChange) -> Result<UserAccount> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, CheckoutError, _>(|conn| {
            Box::pin(async move {
                let account = lock_account(conn, user_id).await?;
                let balance = change.apply(account.balance)?;
                store_balance(conn, account.id, balance).await
            })
        })
        .await
    }

    async fn charge_order(&self, user_id: i64, order_id: i64, amount: i64) -> Result<OrderCharge> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, CheckoutError, _>(|conn| {
            Box::pin(async move {
                let account = lock_account(conn, user_id).await?;

                let paid: Option<i64> = payments::table
                    .filter(payments::order_id.eq(order_id))
                    .select(payments::id)
                    .first(conn)
                    .await
                    .optional()?;
                if paid.is_some() {
                    return Ok(OrderCharge::AlreadyCharged);
                }

                let balance = BalanceChange::Withdraw(amount).apply(account.balance)?;
                let updated = store_balance(conn, account.id, balance).await?;

                diesel::insert_into(payments::table)
                    .values(&NewPayment {
                        order_id,
                        user_id,
                        amount,
                    })
                    .execute(conn)
                    .await?;

                Ok(OrderCharge::Charged(updated))
            })
        })
        .await
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::{HashMap, HashSet};

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct State {
        accounts: HashMap<i64, UserAccount>,
        paid_orders: HashSet<i64>,
    }

    #[derive(Default)]
    pub struct InMemoryAccountRepo {
        state: Mutex<State>,
    }

    impl InMemoryAccountRepo {
        pub async fn with_balance(self, user_id: i64, balance: i64) -> Self {
            let id = user_id;
            self.state
                .lock()
                .await
                .accounts
                .insert(user_id, UserAccount { id, user_id, balance });
            self
        }

        pub async fn balance(&self, user_id: i64) -> Option<i64> {
            self.state.lock().await.accounts.get(&user_id).map(|a| a.balance)
        }

        pub async fn len(&self) -> usize {
            self.state.lock().await.accounts.len()
        }
    }

    #[async_trait]
    impl AccountRepo for InMemoryAccountRepo {
        async fn open(&self, user_id: i64) -> Result<bool> {
            let mut state = self.state.lock().await;
            if state.accounts.contains_key(&user_id) {
                return Ok(false);
            }
            let id = state.accounts.len() as i64 + 1;
            state
                .accounts
                .insert(user_id, UserAccount { id, user_id, balance: 0 });
            Ok(true)
        }

        async fn get(&self, user_id: i64) -> Result<UserAccount> {
            self.state
                .lock()
                .await
                .accounts
                .get(&user_id)
                .cloned()
                .ok_or_else(|| missing(user_id))
        }

        async fn change_balance(&self, user_id: i64, change: BalanceChange) -> Result<UserAccount> {
            let mut state = self.state.lock().await;
            let account = state.accounts.get_mut(&user_id).ok_or_else(|| missing(user_id))?;
            account.balance = change.apply(account.balance)?;
            Ok(account.clone())
        }

        async fn charge_order(&self, user_id: i64, order_id: i64, amount: i64) -> Result<OrderCharge> {
            let mut state = self.state.lock().await;
            let State {
                accounts,
                paid_orders,
            } = &mut *state;
            let account = accounts.get_mut(&user_id).ok_or_else(|| missing(user_id))?;
            if paid_orders.contains(&order_id) {
                return Ok(OrderCharge::AlreadyCharged);
            }
            account.balance = BalanceChange::Withdraw(amount).apply(account.balance)?;
            paid_orders.insert(order_id);
            Ok(OrderCharge::Charged(account.clone()))
        }
    }
}
