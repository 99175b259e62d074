use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serialport::SerialPort;

use mdb_master::{BillValidator, Device, Vmc};

fn open(port: &str) -> Result<Box<dyn SerialPort>> {
    serialport::new(port, 115_200)
        .timeout(Duration::from_millis(10))
        .open()
        .with_context(|| format!("Failed to open serial port {}", port))
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());

    // Start from a freshly booted adapter. It drops the USB connection while
    // rebooting, so the port has to be opened again.
    Device::new(open(&port)?).reset_adapter()?;
    thread::sleep(Duration::from_secs(1));

    let mut vmc = Vmc::new(Device::new(open(&port)?));
    vmc.attach(Box::new(BillValidator::default()));
    vmc.prepare()?;
    vmc.run(Duration::from_millis(100));
    vmc.terminate();
    Ok(())
}
