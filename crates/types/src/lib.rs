pub mod catalog;
pub mod error;
pub mod intent;
pub mod provider;

pub use catalog::{PlanPrice, ServiceCatalog, ServiceEntry, TokenPack, TokenPackCatalog};
pub use error::{PaymentError, PaymentResult};
pub use intent::{Currency, IntentMetadata, IntentStatus, PaymentIntent, PaymentMethod};
pub use provider::{
    Capability, ChargeStatus, Customer, InitiatedPayment, PaymentRequest, PaymentType,
    ProviderKind,
};
