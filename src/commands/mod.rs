pub mod run;
pub mod status;
pub mod sync_once;
