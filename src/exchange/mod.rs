//! Exchange client abstraction.
//!
//! The order engine and quoting cycle only talk to the exchange through
//! [`ExchangeClient`]; [`ClobClient`] is the live HTTP adapter and
//! [`MockExchange`] the in-process fake used by tests and offline runs.

pub mod clob;
pub mod mock;
pub mod signing;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::ExchangeError;
use crate::trading::Side;

pub use clob::ClobClient;
pub use mock::MockExchange;
pub use signing::Signer;

/// Operations the bot needs from an exchange.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit a limit order and return the exchange-assigned id.
    async fn execute_order(
        &self,
        price: Decimal,
        size: Decimal,
        side: Side,
        token_id: &str,
    ) -> Result<String, ExchangeError>;

    /// Current order-book price for `token_id`.
    async fn get_orderbook_price(&self, token_id: &str) -> Result<Decimal, ExchangeError>;

    /// Whether [`ExchangeClient::cancel_order`] is implemented.
    fn supports_cancel(&self) -> bool {
        false
    }

    /// Cancel a resting order.
    async fn cancel_order(&self, _order_id: &str) -> Result<(), ExchangeError> {
        Err(ExchangeError::Unsupported("cancel_order"))
    }
}
