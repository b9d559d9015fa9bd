// private sub-module defined in other files
mod accum;
mod depths;
mod filled;
mod flow_dir;
mod wsheds;

// exports identifiers from private sub-modules in the current module namespace
pub use self::accum::Accum;
pub use self::depths::Depths;
pub use self::filled::Filled;
pub use self::flow_dir::FlowDir;
pub use self::wsheds::Wsheds;
