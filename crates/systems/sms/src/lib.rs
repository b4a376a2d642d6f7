//! Sega Master System video peripheral for the Z80 benchmark harness
//!
//! # Architecture
//!
//! - **VDP**: Sega 315-5124 port protocol and 16 KB VRAM ([`Vdp`])
//! - **Ports**: 0xBE/0xBF routed to the VDP through engine port hooks ([`SmsPorts`])
//!
//! Only what a benchmark can observe through the data and control ports is
//! modeled: no registers, palette, rendering or interrupts.

mod bus;
mod vdp;

pub use bus::{SmsPorts, VDP_CONTROL_PORT, VDP_DATA_PORT};
pub use vdp::{Mode, Vdp, STATUS, VRAM_SIZE};
