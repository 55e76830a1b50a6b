//! Doubles for the address book and the payment gateway.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storefront_core::BoxFuture;
use storefront_core::address::{Address, AddressBook};
use storefront_core::error::StoreError;
use storefront_core::payment::{CODE_PROCESSING, GatewayError, PaymentGateway, TradeQuery};
use storefront_core::{AddressId, Money, OrderId, UserId};

/// Address book backed by a vector.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAddressBook {
    addresses: Arc<Mutex<Vec<Address>>>,
}

impl InMemoryAddressBook {
    /// Empty address book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn add(&self, address: Address) -> Result<(), StoreError> {
        self.addresses
            .lock()
            .map_err(|_| StoreError::Unavailable("address mutex poisoned".to_string()))?
            .push(address);
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<Address>, StoreError> {
        self.addresses
            .lock()
            .map(|a| a.clone())
            .map_err(|_| StoreError::Unavailable("address mutex poisoned".to_string()))
    }
}

impl AddressBook for InMemoryAddressBook {
    fn get(&self, address_id: AddressId, user_id: UserId) -> BoxFuture<'_, Result<Option<Address>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .snapshot()?
                .into_iter()
                .find(|a| a.id == address_id && a.user_id == user_id))
        })
    }

    fn list(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Address>, StoreError>> {
        Box::pin(async move {
            let mut owned: Vec<Address> = self
                .snapshot()?
                .into_iter()
                .filter(|a| a.user_id == user_id)
                .collect();
            owned.sort_by_key(|a| !a.is_default);
            Ok(owned)
        })
    }
}

/// A page-pay request the gateway received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedPayment {
    /// Order
    pub order_id: OrderId,
    /// Amount requested
    pub amount: Money,
    /// Subject line
    pub description: String,
}

/// Gateway that replays a script of query answers.
///
/// Once the script is exhausted every query answers "processing".
#[derive(Debug, Clone, Default)]
pub struct ScriptedPaymentGateway {
    script: Arc<Mutex<VecDeque<Result<TradeQuery, GatewayError>>>>,
    initiated: Arc<Mutex<Vec<InitiatedPayment>>>,
    queries: Arc<AtomicUsize>,
    refuse_initiation: Arc<AtomicBool>,
}

impl ScriptedPaymentGateway {
    /// Gateway with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an answer to the script.
    #[must_use]
    pub fn then(self, answer: Result<TradeQuery, GatewayError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(answer);
        }
        self
    }

    /// Append a raw `(code, trade_status, trade_no)` answer.
    #[must_use]
    pub fn then_answer(self, code: &str, trade_status: Option<&str>, trade_no: Option<&str>) -> Self {
        self.then(Ok(TradeQuery {
            code: code.to_string(),
            trade_status: trade_status.map(str::to_string),
            trade_no: trade_no.map(str::to_string),
        }))
    }

    /// Make `initiate_payment` fail with a transport error.
    pub fn refuse_initiation(&self, refuse: bool) {
        self.refuse_initiation.store(refuse, Ordering::SeqCst);
    }

    /// Number of queries answered so far.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Page-pay requests received so far.
    #[must_use]
    pub fn initiated(&self) -> Vec<InitiatedPayment> {
        self.initiated.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

impl PaymentGateway for ScriptedPaymentGateway {
    fn initiate_payment(
        &self,
        order_id: &OrderId,
        amount: Money,
        description: &str,
    ) -> BoxFuture<'_, Result<String, GatewayError>> {
        let request = InitiatedPayment {
            order_id: order_id.clone(),
            amount,
            description: description.to_string(),
        };
        Box::pin(async move {
            if self.refuse_initiation.load(Ordering::SeqCst) {
                return Err(GatewayError::Transport("connection refused".to_string()));
            }
            let url = format!("https://gateway.test/pay?out_trade_no={}", request.order_id);
            self.initiated
                .lock()
                .map_err(|_| GatewayError::Protocol("gateway mutex poisoned".to_string()))?
                .push(request);
            Ok(url)
        })
    }

    fn query_payment(&self, _order_id: &OrderId) -> BoxFuture<'_, Result<TradeQuery, GatewayError>> {
        Box::pin(async move {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .map_err(|_| GatewayError::Protocol("gateway mutex poisoned".to_string()))?
                .pop_front();
            next.unwrap_or_else(|| {
                Ok(TradeQuery {
                    code: CODE_PROCESSING.to_string(),
                    trade_status: None,
                    trade_no: None,
                })
            })
        })
    }
}
