//! In-process exchange for tests and offline runs.
//!
//! Records every submission and cancel, serves configured prices, and can be
//! scripted to fail the next N calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::ExchangeClient;
use crate::error::ExchangeError;
use crate::trading::Side;

/// An order the mock accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSubmission {
    /// Assigned id.
    pub order_id: String,
    /// Token traded.
    pub token_id: String,
    /// Order side.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Size.
    pub size: Decimal,
}

#[derive(Debug, Default)]
struct MockState {
    prices: HashMap<String, Decimal>,
    default_price: Option<Decimal>,
    broken_prices: HashSet<String>,
    order_failures: VecDeque<ExchangeError>,
    cancel_failures: VecDeque<ExchangeError>,
    submissions: Vec<MockSubmission>,
    attempts: u32,
    cancelled: Vec<String>,
    next_id: u64,
}

/// Mock exchange client.
#[derive(Debug)]
pub struct MockExchange {
    state: Mutex<MockState>,
    supports_cancel: bool,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    /// Create a mock with no prices and cancel support.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            supports_cancel: true,
        }
    }

    /// A mock whose client lacks cancel support.
    pub fn without_cancel() -> Self {
        Self {
            supports_cancel: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `price` for `token_id`.
    pub fn set_price(&self, token_id: &str, price: Decimal) {
        self.lock().prices.insert(token_id.to_string(), price);
    }

    /// Serve `price` for every token without an explicit price.
    pub fn set_default_price(&self, price: Decimal) {
        self.lock().default_price = Some(price);
    }

    /// Make price queries for `token_id` fail.
    pub fn break_price(&self, token_id: &str) {
        self.lock().broken_prices.insert(token_id.to_string());
    }

    /// Fail the next order submission with `error`.
    pub fn fail_next_order(&self, error: ExchangeError) {
        self.lock().order_failures.push_back(error);
    }

    /// Fail the next cancel with `error`.
    pub fn fail_next_cancel(&self, error: ExchangeError) {
        self.lock().cancel_failures.push_back(error);
    }

    /// Accepted submissions, in order.
    pub fn submissions(&self) -> Vec<MockSubmission> {
        self.lock().submissions.clone()
    }

    /// Number of accepted submissions.
    pub fn submission_count(&self) -> usize {
        self.lock().submissions.len()
    }

    /// Submission attempts, failed ones included.
    pub fn attempt_count(&self) -> u32 {
        self.lock().attempts
    }

    /// Cancelled order ids, in order.
    pub fn cancelled(&self) -> Vec<String> {
        self.lock().cancelled.clone()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn execute_order(
        &self,
        price: Decimal,
        size: Decimal,
        side: Side,
        token_id: &str,
    ) -> Result<String, ExchangeError> {
        let mut state = self.lock();
        state.attempts += 1;
        if let Some(error) = state.order_failures.pop_front() {
            return Err(error);
        }

        state.next_id += 1;
        let order_id = format!("mock-{}", state.next_id);
        state.submissions.push(MockSubmission {
            order_id: order_id.clone(),
            token_id: token_id.to_string(),
            side,
            price,
            size,
        });
        Ok(order_id)
    }

    async fn get_orderbook_price(&self, token_id: &str) -> Result<Decimal, ExchangeError> {
        let state = self.lock();
        if state.broken_prices.contains(token_id) {
            return Err(ExchangeError::Transient(format!("no book for {}", token_id)));
        }
        state
            .prices
            .get(token_id)
            .copied()
            .or(state.default_price)
            .ok_or_else(|| ExchangeError::Rejected(format!("unknown token {}", token_id)))
    }

    fn supports_cancel(&self) -> bool {
        self.supports_cancel
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        if !self.supports_cancel {
            return Err(ExchangeError::Unsupported("cancel_order"));
        }
        let mut state = self.lock();
        if let Some(error) = state.cancel_failures.pop_front() {
            return Err(error);
        }
        state.cancelled.push(order_id.to_string());
        Ok(())
    }
}
