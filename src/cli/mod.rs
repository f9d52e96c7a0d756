pub mod setup;
pub mod stocks;
pub mod ui;
pub mod watch;
