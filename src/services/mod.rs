pub mod download_token;
pub mod initiator;
pub mod pending_sweeper;
pub mod pricing;
pub mod reconciler;
pub mod side_effects;

pub use download_token::DownloadTokenSigner;
pub use initiator::{InitiateInput, InitiateOutput, InitiationError, TransactionInitiator};
pub use pending_sweeper::PendingSweeper;
pub use reconciler::{CheckoutPages, ReturnCallback, ReturnOutcome, ReturnReconciler, ReturnStatus};
pub use side_effects::{SideEffectDispatcher, SideEffectWorker};
