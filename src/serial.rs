//! Kernel logging.
//!
//! The `log_*!` macros forward to the `log` facade. On bare-metal x86_64 the
//! records go out on COM1; hosted builds only set the level and leave the
//! choice of logger to the host.

use log::LevelFilter;

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::__log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::__log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::__log::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::__log::error!($($arg)*)
    };
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod com1 {
    use core::fmt::Write;
    use lazy_static::lazy_static;
    use log::{Log, Metadata, Record};
    use spin::Mutex;
    use x86_64::instructions::port::Port;

    const COM1_BASE: u16 = 0x3F8;
    const LINE_STS_TX_EMPTY: u8 = 0x20;

    pub struct SerialPort {
        base: u16,
    }

    impl SerialPort {
        fn reg(&self, offset: u16) -> Port<u8> {
            Port::new(self.base + offset)
        }

        fn init(&mut self) {
            // 38400 baud, 8N1, FIFO on, IRQs off.
            let setup: [(u16, u8); 7] = [
                (1, 0x00),
                (3, 0x80),
                (0, 0x03),
                (1, 0x00),
                (3, 0x03),
                (2, 0xC7),
                (4, 0x0B),
            ];
            for (offset, value) in setup {
                unsafe { self.reg(offset).write(value) };
            }
        }

        fn send(&mut self, byte: u8) {
            let mut line_sts = self.reg(5);
            unsafe {
                while line_sts.read() & LINE_STS_TX_EMPTY == 0 {}
                self.reg(0).write(byte);
            }
        }
    }

    impl Write for SerialPort {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            for byte in s.bytes() {
                self.send(byte);
            }
            Ok(())
        }
    }

    lazy_static! {
        static ref SERIAL1: Mutex<SerialPort> = {
            let mut port = SerialPort { base: COM1_BASE };
            port.init();
            Mutex::new(port)
        };
    }

    pub struct SerialLogger;

    impl Log for SerialLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            // The lock may be held by the code we interrupted.
            x86_64::instructions::interrupts::without_interrupts(|| {
                let _ = writeln!(SERIAL1.lock(), "[{}] {}", record.level(), record.args());
            });
        }

        fn flush(&self) {}
    }

    pub static LOGGER: SerialLogger = SerialLogger;
}

/// Install the kernel log sink and set the maximum level.
pub fn init(level: LevelFilter) {
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    {
        let _ = log::set_logger(&com1::LOGGER);
    }
    log::set_max_level(level);
}
