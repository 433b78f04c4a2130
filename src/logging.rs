//! Unified logging macro.
//!
//! Internal logging goes through `knx_log!`, which selects a backend at
//! compile time:
//!
//! - `defmt` feature: `defmt::` macros (embedded targets)
//! - `log` feature: `log::` macros (host targets)
//! - neither: logging compiles to nothing
//!
//! # Usage
//!
//! ```rust,ignore
//! knx_log!(warn, "inbound queue for {} is full, dropping message", addr);
//! ```

/// Unified logging macro - selects defmt::, log:: or a no-op based on features
#[macro_export]
#[cfg(feature = "defmt")]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { defmt::info!($($arg)*) };
    (debug, $($arg:tt)*) => { defmt::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { defmt::warn!($($arg)*) };
    (error, $($arg:tt)*) => { defmt::error!($($arg)*) };
    (trace, $($arg:tt)*) => { defmt::trace!($($arg)*) };
}

#[macro_export]
#[cfg(all(feature = "log", not(feature = "defmt")))]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { log::info!($($arg)*) };
    (debug, $($arg:tt)*) => { log::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { log::warn!($($arg)*) };
    (error, $($arg:tt)*) => { log::error!($($arg)*) };
    (trace, $($arg:tt)*) => { log::trace!($($arg)*) };
}

#[macro_export]
#[cfg(not(any(feature = "defmt", feature = "log")))]
macro_rules! knx_log {
    ($level:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        // Evaluate arguments so unused-variable lints behave the same
        // with logging disabled.
        $( let _ = &$arg; )*
    }};
}
