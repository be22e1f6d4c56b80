//! # Runtime Configuration Module
//!
//! Coroutine spawning and stack sizing shared by the server shell and the
//! worker pools.
//!
//! Stack sizes come from [`crate::config::ServerConfig`]: `stack_size` in the
//! YAML file or `MINICOAP_STACK_SIZE` in the environment, decimal (`65536`) or
//! hexadecimal (`0x10000`). Default: `0x10000` (64 KB).

use may::coroutine::JoinHandle;
use std::io;

/// Default coroutine stack size.
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Parse a decimal or `0x`-prefixed hex byte count. Zero is rejected.
pub fn parse_stack_size(val: &str) -> Option<usize> {
    let val = val.trim();
    let parsed = match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    };
    parsed.filter(|n| *n > 0)
}

/// Spawn a named coroutine with an explicit stack size.
#[allow(unsafe_code)]
pub(crate) fn spawn_coroutine<F>(
    name: String,
    stack_size: usize,
    f: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    // SAFETY: may marks spawn unsafe because a coroutine must not block its OS
    // thread for long or rely on thread-local storage. Crate coroutines only
    // block on may sockets, channels and timers, and own everything they touch.
    unsafe {
        may::coroutine::Builder::new()
            .name(name)
            .stack_size(stack_size)
            .spawn(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stack_size() {
        assert_eq!(parse_stack_size("0x4000"), Some(0x4000));
        assert_eq!(parse_stack_size("32768"), Some(32768));
        assert_eq!(parse_stack_size(" 0X8000 "), Some(0x8000));
        assert_eq!(parse_stack_size("0"), None);
        assert_eq!(parse_stack_size("lots"), None);
    }
}
