//! Board peripherals behind the core's sensing traits.

#[cfg(target_os = "none")]
pub mod oscillator;
pub mod temperature;
