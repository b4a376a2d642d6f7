//! Sega Master System port map as engine port hooks

use crate::vdp::Vdp;
use std::cell::RefCell;
use std::rc::Rc;
use z80bench_core::engine::PortHooks;
use z80bench_core::logging::{log, LogCategory, LogLevel};

/// VDP data port
pub const VDP_DATA_PORT: u8 = 0xBE;
/// VDP control/status port
pub const VDP_CONTROL_PORT: u8 = 0xBF;

/// SMS I/O ports
///
/// - 0xBE: VDP data port
/// - 0xBF: VDP control/status port
///
/// Every other port falls through to the engine's own port space.
pub struct SmsPorts {
    // Shared VDP reference
    vdp: Rc<RefCell<Vdp>>,
}

impl SmsPorts {
    pub fn new(vdp: Rc<RefCell<Vdp>>) -> Self {
        Self { vdp }
    }
}

impl PortHooks for SmsPorts {
    fn before_port_read(&mut self, port: u8) -> Option<u8> {
        match port {
            VDP_DATA_PORT => Some(self.vdp.borrow_mut().read_data()),
            VDP_CONTROL_PORT => Some(self.vdp.borrow_mut().read_control()),
            _ => {
                log(LogCategory::Ports, LogLevel::Trace, || {
                    format!("SMS: unmapped port read {:02X}", port)
                });
                None
            }
        }
    }

    fn after_port_write(&mut self, port: u8, value: u8) {
        match port {
            VDP_DATA_PORT => self.vdp.borrow_mut().write_data(value),
            VDP_CONTROL_PORT => self.vdp.borrow_mut().write_control(value),
            _ => {
                log(LogCategory::Ports, LogLevel::Trace, || {
                    format!("SMS: unmapped port write {:02X} <- {:02X}", port, value)
                });
            }
        }
    }
}
