//! Retrying register access.

use defmt_or_log::{error, trace};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{Error as _, I2c};

use super::regs::{Reg, ADDR};
use crate::Error;

/// Back-off before each retry of a failed transfer, ms.
pub const RETRY_SLEEP_MS: [u32; 5] = [10, 20, 30, 40, 50];

/// Register bus of one charger.
pub struct RegisterBus<I, D> {
    i2c: I,
    delay: D,
    addr: u8,
}

impl<I: I2c, D: DelayNs> RegisterBus<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        RegisterBus {
            i2c,
            delay,
            addr: ADDR,
        }
    }

    /// Use a bus address other than the default.
    pub fn with_address(mut self, addr: u8) -> Self {
        self.addr = addr;
        self
    }

    pub async fn read(&mut self, reg: Reg) -> Result<u8, Error> {
        let mut val = 0u8;
        let mut retries = RETRY_SLEEP_MS.iter();
        loop {
            let res = self
                .i2c
                .write_read(
                    self.addr,
                    core::slice::from_ref(&reg.to_u8()),
                    core::slice::from_mut(&mut val),
                )
                .await;
            match res {
                Ok(()) => return Ok(val),
                Err(e) => match retries.next() {
                    Some(&ms) => self.delay.delay_ms(ms).await,
                    None => {
                        error!("read from {:#x} failed: {:?}", reg.to_u8(), e.kind());
                        return Err(Error::Hardware);
                    }
                },
            }
        }
    }

    pub async fn write(&mut self, reg: Reg, val: u8) -> Result<(), Error> {
        let buf = [reg.to_u8(), val];
        let mut retries = RETRY_SLEEP_MS.iter();
        loop {
            match self.i2c.write(self.addr, &buf).await {
                Ok(()) => {
                    trace!("wrote {:#x} = {:#x}", reg.to_u8(), val);
                    return Ok(());
                }
                Err(e) => match retries.next() {
                    Some(&ms) => self.delay.delay_ms(ms).await,
                    None => {
                        error!("write {:#x} to {:#x} failed: {:?}", val, reg.to_u8(), e.kind());
                        return Err(Error::Hardware);
                    }
                },
            }
        }
    }

    pub async fn modify<F: FnOnce(u8) -> u8>(&mut self, reg: Reg, func: F) -> Result<(), Error> {
        let val = self.read(reg).await?;
        let val = func(val);
        self.write(reg, val).await
    }

    /// Replace the bits of `reg` selected by `mask` with those of `val`.
    pub async fn masked_write(&mut self, reg: Reg, mask: u8, val: u8) -> Result<(), Error> {
        self.modify(reg, |old| (old & !mask) | (val & mask)).await
    }
}
