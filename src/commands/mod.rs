//! Subcommand implementations, one module per concern, flat re-exported
//! for `main.rs`'s dispatch match. Grounded on the teacher's
//! `commands/mod.rs` layout.

pub mod migrate;
pub mod reload_airspace;
pub mod run;

pub use migrate::handle_migrate;
pub use reload_airspace::handle_reload_airspace;
pub use run::handle_run;
