pub mod clean;
pub mod info;
pub mod peer;

pub use clean::run_clean;
pub use info::run_info;
pub use peer::{run_peer, EchoRule, PeerOptions};
