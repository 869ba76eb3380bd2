/// Interfaces Layer - External Entry Points
///
/// Everything the core treats as an outside collaborator: the JSON-lines
/// process driver, the command codec and the event handlers that deliver
/// events somewhere.
///
/// ## Modules
/// - `cli`: Command-line interface (main.rs logic)
/// - `command`: Inbound command decoding, outbound event encoding
/// - `handlers`: `EventHandler` implementations

pub mod cli;
pub mod command;
pub mod handlers;
