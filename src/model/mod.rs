pub mod amount;
pub mod chain;
pub mod operation;
pub mod state;

pub use amount::{ASSET_DECIMALS, DecimalAmount, PRICE_DECIMALS, SHARE_DECIMALS};
pub use chain::Chain;
pub use operation::{LifecycleState, OperationKind, PendingOperation};
pub use state::{Loadable, NetworkState, VaultGlobalState, VaultPosition, VaultSnapshot};
