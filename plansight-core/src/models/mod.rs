pub mod capability;
pub mod plan_row;
pub mod session;
pub mod settings;

pub use capability::*;
pub use plan_row::*;
pub use session::*;
pub use settings::*;
