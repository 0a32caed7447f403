#[macro_use]
mod logging;
