pub mod backup;
pub mod import;
pub mod settings;
pub mod stats;
pub mod tags;
pub mod trades;
pub mod users;

pub use backup::*;
pub use import::*;
pub use settings::*;
pub use stats::*;
pub use tags::*;
pub use trades::*;
pub use users::*;
