pub mod payment;

pub use payment::{MockPaymentGateway, PaymentGateway, PaymentOutcome, PaymentReceipt};
