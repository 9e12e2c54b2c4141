//! Domain model
pub mod events;
pub mod order;
pub mod value_objects;

pub use order::{
    CustomerDetails, LineItem, NewOrder, Order, OrderStatus, PaymentDetails, PaymentMethod,
    PaymentSettlement, PaymentStatus,
};
pub use value_objects::{Msisdn, MsisdnError};
