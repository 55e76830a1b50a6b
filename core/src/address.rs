//! Delivery addresses (read-only here; CRUD lives elsewhere).

use crate::BoxFuture;
use crate::error::StoreError;
use crate::types::{AddressId, UserId};
use serde::{Deserialize, Serialize};

/// A buyer's delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Address id
    pub id: AddressId,
    /// Owner
    pub user_id: UserId,
    /// Recipient name
    pub receiver: String,
    /// Street address
    pub addr: String,
    /// Postal code
    pub zip_code: Option<String>,
    /// Contact phone
    pub phone: String,
    /// Whether this is the owner's default address
    pub is_default: bool,
}

/// Address lookup used to validate commits and render previews.
pub trait AddressBook: Send + Sync {
    /// Fetch an address only if it belongs to `user_id`.
    fn get(&self, address_id: AddressId, user_id: UserId)
    -> BoxFuture<'_, Result<Option<Address>, StoreError>>;

    /// All addresses of a user, default first.
    fn list(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Address>, StoreError>>;
}
