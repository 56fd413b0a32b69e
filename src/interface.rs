//! Bus transports for the BME68x.
//!
//! The sensor speaks the same register protocol over I2C and SPI but frames it
//! differently. [`I2cInterface`] sends a register pointer with every
//! transaction. [`SpiInterface`] ignores the bus address, sets bit 7 of the
//! register byte for reads and clears it for writes. SPI only sees 7 bits of
//! register address, so the 256 byte register space is split into two memory
//! pages selected through the `mem_page` register.

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c, spi::SpiDevice};
#[cfg(feature = "async")]
use embedded_hal_async::{
    delay::DelayNs as AsyncDelayNs, i2c::I2c as AsyncI2c, spi::SpiDevice as AsyncSpiDevice,
};
use embedded_hal::spi::Operation as SpiOperation;

use log::debug;

use crate::constants::{
    CMD_SOFT_RESET, LEN_INTERLEAVE_BUFF, MEM_PAGE0, MEM_PAGE1, MEM_PAGE_MSK, PERIOD_RESET_US,
    REG_MEM_PAGE, REG_SOFT_RESET, SPI_RD_MSK, SPI_WR_MSK,
};

/// register access shared by the I2C and SPI transports
#[maybe_async_cfg::maybe(
    sync(
        cfg(not(feature = "async")),
        keep_self,
        idents(AsyncDelayNs(sync = "DelayNs"))
    ),
    async(feature = "async", keep_self)
)]
#[allow(async_fn_in_trait)]
pub trait Interface {
    type Error;

    /// soft reset the sensor and wait for it to come back
    async fn reset<D: AsyncDelayNs>(&mut self, address: u8, delayer: &mut D) -> Result<(), Self::Error>;

    /// burst read starting at `register` into `buffer`
    async fn read(&mut self, address: u8, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// write `data[i]` to `registers[i]` in a single transaction.
    /// Silently does nothing when `data` is empty or holds more than `LEN_INTERLEAVE_BUFF / 2` bytes.
    async fn write(&mut self, address: u8, registers: &[u8], data: &[u8]) -> Result<(), Self::Error>;
}

fn fits_interleave_buffer(data: &[u8]) -> bool {
    !data.is_empty() && data.len() <= LEN_INTERLEAVE_BUFF / 2
}

/// memory page holding `register`
pub(crate) fn page_for_register(register: u8) -> u8 {
    if register > 0x7f {
        MEM_PAGE1
    } else {
        MEM_PAGE0
    }
}


/// addressed transport, every transaction carries the I2C address
#[derive(Debug)]
pub struct I2cInterface<I2C> {
    i2c: I2C,
}

impl<I2C> I2cInterface<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// give back the I2C bus
    pub fn release(self) -> I2C {
        self.i2c
    }
}

#[maybe_async_cfg::maybe(
    sync(
        cfg(not(feature = "async")),
        keep_self,
        idents(AsyncI2c(sync = "I2c"), AsyncDelayNs(sync = "DelayNs"))
    ),
    async(feature = "async", keep_self)
)]
impl<I2C> Interface for I2cInterface<I2C>
where
    I2C: AsyncI2c,
{
    type Error = I2C::Error;

    async fn reset<D: AsyncDelayNs>(&mut self, address: u8, delayer: &mut D) -> Result<(), Self::Error> {
        debug!("i2c soft reset of {:#04x}", address);
        self.write(address, &[REG_SOFT_RESET], &[CMD_SOFT_RESET]).await?;
        delayer.delay_us(PERIOD_RESET_US).await;
        Ok(())
    }

    async fn read(&mut self, address: u8, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c.write_read(address, &[register], buffer).await
    }

    async fn write(&mut self, address: u8, registers: &[u8], data: &[u8]) -> Result<(), Self::Error> {
        if !fits_interleave_buffer(data) {
            debug!("  i2c write of {} bytes skipped", data.len());
            return Ok(());
        }
        let mut write_buf = [0u8; LEN_INTERLEAVE_BUFF];
        let mut len = 0;
        for (register, value) in registers.iter().zip(data) {
            write_buf[len] = *register;
            write_buf[len + 1] = *value;
            len += 2;
        }
        self.i2c.write(address, &write_buf[..len]).await
    }
}


/// paged transport, chip select framing, address ignored
#[derive(Debug)]
pub struct SpiInterface<SPI> {
    spi: SPI,
    /// page the sensor is believed to be on, `None` until first synchronised
    memory_page: Option<u8>,
}

impl<SPI> SpiInterface<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            memory_page: None,
        }
    }

    /// give back the SPI device
    pub fn release(self) -> SPI {
        self.spi
    }

    /// cached memory page, `MEM_PAGE0` or `MEM_PAGE1`
    pub fn memory_page(&self) -> Option<u8> {
        self.memory_page
    }
}

#[maybe_async_cfg::maybe(
    sync(
        cfg(not(feature = "async")),
        keep_self,
        idents(AsyncSpiDevice(sync = "SpiDevice"))
    ),
    async(feature = "async", keep_self)
)]
impl<SPI> SpiInterface<SPI>
where
    SPI: AsyncSpiDevice,
{
    // register byte goes out with the read bit set, page handling is up to the caller
    async fn read_raw(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), SPI::Error> {
        self.spi
            .transaction(&mut [
                SpiOperation::Write(&[register | SPI_RD_MSK]),
                SpiOperation::Read(buffer),
            ])
            .await
    }

    /// read the page select register and refresh the cache from it
    async fn read_memory_page(&mut self) -> Result<(), SPI::Error> {
        let mut result_buf = [0u8; 1];
        self.read_raw(REG_MEM_PAGE, &mut result_buf).await?;
        self.memory_page = Some(result_buf[0] & MEM_PAGE_MSK);
        debug!("  spi memory page is now {:#04x}", result_buf[0] & MEM_PAGE_MSK);
        Ok(())
    }

    /// switch pages if `register` is not on the cached one
    async fn set_memory_page(&mut self, register: u8) -> Result<(), SPI::Error> {
        let memory_page = page_for_register(register);
        if self.memory_page == Some(memory_page) {
            return Ok(());
        }
        debug!("  spi switching to memory page {:#04x} for register {:#04x}", memory_page, register);
        let mut result_buf = [0u8; 1];
        self.read_raw(REG_MEM_PAGE, &mut result_buf).await?;
        let page_reg = (result_buf[0] & !MEM_PAGE_MSK) | (memory_page & MEM_PAGE_MSK);
        self.spi.write(&[REG_MEM_PAGE & SPI_WR_MSK, page_reg]).await?;
        self.memory_page = Some(memory_page);
        Ok(())
    }
}

#[maybe_async_cfg::maybe(
    sync(
        cfg(not(feature = "async")),
        keep_self,
        idents(AsyncSpiDevice(sync = "SpiDevice"), AsyncDelayNs(sync = "DelayNs"))
    ),
    async(feature = "async", keep_self)
)]
impl<SPI> Interface for SpiInterface<SPI>
where
    SPI: AsyncSpiDevice,
{
    type Error = SPI::Error;

    async fn reset<D: AsyncDelayNs>(&mut self, _address: u8, delayer: &mut D) -> Result<(), Self::Error> {
        debug!("spi soft reset");
        self.read_memory_page().await?;
        self.write(0, &[REG_SOFT_RESET], &[CMD_SOFT_RESET]).await?;
        delayer.delay_us(PERIOD_RESET_US).await;
        // reset can move the sensor to the other page without us noticing
        self.read_memory_page().await?;
        Ok(())
    }

    async fn read(&mut self, _address: u8, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.set_memory_page(register).await?;
        self.read_raw(register, buffer).await
    }

    async fn write(&mut self, _address: u8, registers: &[u8], data: &[u8]) -> Result<(), Self::Error> {
        if !fits_interleave_buffer(data) {
            debug!("  spi write of {} bytes skipped", data.len());
            return Ok(());
        }
        let mut write_buf = [0u8; LEN_INTERLEAVE_BUFF];
        let mut len = 0;
        for (register, value) in registers.iter().zip(data) {
            self.set_memory_page(*register).await?;
            write_buf[len] = *register & SPI_WR_MSK;
            write_buf[len + 1] = *value;
            len += 2;
        }
        self.spi.write(&write_buf[..len]).await
    }
}


#[cfg(all(test, not(feature = "async")))]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::spi::{ErrorType, Operation, SpiDevice};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const ADDR: u8 = 0x77;

    #[test]
    fn i2c_write_interleaves_register_value_pairs() {
        let expectations = [Transaction::write(ADDR, vec![0x71, 0x01, 0x72, 0x02, 0x74, 0x03])];
        let mut interface = I2cInterface::new(I2cMock::new(&expectations));
        interface.write(ADDR, &[0x71, 0x72, 0x74], &[0x01, 0x02, 0x03]).unwrap();
        interface.release().done();
    }

    #[test]
    fn i2c_read_sends_register_pointer_then_burst_reads() {
        let expectations = [Transaction::write_read(ADDR, vec![0x8a], vec![0x11, 0x22, 0x33])];
        let mut interface = I2cInterface::new(I2cMock::new(&expectations));
        let mut result_buf = [0u8; 3];
        interface.read(ADDR, 0x8a, &mut result_buf).unwrap();
        assert_eq!(result_buf, [0x11, 0x22, 0x33]);
        interface.release().done();
    }

    #[test]
    fn i2c_write_outside_capacity_is_a_silent_noop() {
        let mut interface = I2cInterface::new(I2cMock::new(&[]));
        interface.write(ADDR, &[], &[]).unwrap();
        let registers = [0u8; 11];
        interface.write(ADDR, &registers, &[0u8; 11]).unwrap();
        interface.release().done();
    }

    #[test]
    fn i2c_reset_sends_the_magic_byte() {
        let expectations = [Transaction::write(ADDR, vec![REG_SOFT_RESET, CMD_SOFT_RESET])];
        let mut interface = I2cInterface::new(I2cMock::new(&expectations));
        interface.reset(ADDR, &mut NoopDelay::new()).unwrap();
        interface.release().done();
    }

    /// register file behind an SPI chip select. Only 7 bits of register
    /// address reach the sensor, bit 4 of the page select register (0x73 on
    /// the wire) picks the half: set shows 0x00..=0x7f, clear shows 0x80..=0xff.
    struct PagedSensor {
        page_reg: u8,
        mem: [u8; 256],
        page_writes: usize,
    }

    impl PagedSensor {
        fn new(page_reg: u8) -> Self {
            Self {
                page_reg,
                mem: [0u8; 256],
                page_writes: 0,
            }
        }

        /// full register address behind a 7 bit wire address
        fn resolve(&self, wire_register: u8) -> usize {
            if self.page_reg & 0x10 != 0 {
                wire_register as usize
            } else {
                wire_register as usize | 0x80
            }
        }
    }

    impl ErrorType for PagedSensor {
        type Error = Infallible;
    }

    impl SpiDevice for PagedSensor {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
            let mut read_from: Option<u8> = None;
            for operation in operations.iter_mut() {
                match operation {
                    Operation::Write(bytes) if bytes.len() == 1 && bytes[0] & 0x80 != 0 => {
                        read_from = Some(bytes[0] & 0x7f);
                    }
                    Operation::Write(bytes) => {
                        for pair in bytes.chunks(2) {
                            let (register, value) = (pair[0], pair[1]);
                            if register == 0x73 {
                                self.page_reg = value;
                                self.page_writes += 1;
                            } else if self.resolve(register) == 0xe0 && value == 0xb6 {
                                self.page_reg = 0x00;
                            } else {
                                let full = self.resolve(register);
                                self.mem[full] = value;
                            }
                        }
                    }
                    Operation::Read(buffer) => {
                        let start = read_from.unwrap_or(0);
                        for (i, byte) in buffer.iter_mut().enumerate() {
                            let wire_register = (start as usize + i) as u8 & 0x7f;
                            *byte = if wire_register == 0x73 {
                                self.page_reg
                            } else {
                                self.mem[self.resolve(wire_register)]
                            };
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        }
    }

    #[test]
    fn spi_page_numbering_matches_register_halves() {
        assert_eq!(page_for_register(0xd0), 0x00);
        assert_eq!(page_for_register(0xe0), 0x00);
        assert_eq!(page_for_register(0x80), 0x00);
        assert_eq!(page_for_register(0x7f), 0x10);
        assert_eq!(page_for_register(0x74), 0x10);
        assert_eq!(page_for_register(0x1d), 0x10);
    }

    #[test]
    fn spi_chip_id_reads_back_after_reset() {
        let mut sensor = PagedSensor::new(0x10);
        sensor.mem[0xd0] = 0x61;
        sensor.mem[0x50] = 0x99;
        let mut interface = SpiInterface::new(sensor);
        interface.reset(0, &mut NoopDelay::new()).unwrap();

        let mut result_buf = [0u8; 1];
        interface.read(0, 0xd0, &mut result_buf).unwrap();
        assert_eq!(result_buf[0], 0x61);
    }

    #[test]
    fn spi_reset_lands_on_the_upper_half() {
        // starting on the lower half, reading 0xe0 there would hit 0x60
        let mut sensor = PagedSensor::new(0x10);
        sensor.mem[0x60] = 0x42;
        let mut interface = SpiInterface::new(sensor);
        interface.reset(0, &mut NoopDelay::new()).unwrap();

        assert_eq!(interface.memory_page(), Some(MEM_PAGE1));
        let sensor = interface.release();
        assert_eq!(sensor.page_reg & MEM_PAGE_MSK, 0x00);
        assert_eq!(sensor.page_writes, 1);
        assert_eq!(sensor.mem[0x60], 0x42);
    }

    #[test]
    fn spi_reset_resynchronises_the_page_after_the_reset() {
        let mut interface = SpiInterface::new(PagedSensor::new(0x10));
        let mut result_buf = [0u8; 1];
        interface.read(0, 0x74, &mut result_buf).unwrap();
        assert_eq!(interface.memory_page(), Some(MEM_PAGE0));

        interface.reset(0, &mut NoopDelay::new()).unwrap();
        // the sensor comes out of reset on the upper half
        assert_eq!(interface.memory_page(), Some(MEM_PAGE1));
        assert_eq!(interface.release().page_reg & MEM_PAGE_MSK, 0x00);
    }

    #[test]
    fn spi_page_switch_happens_once_when_crossing_0x7f() {
        let mut sensor = PagedSensor::new(0x00);
        sensor.mem[0x74] = 0x55;
        sensor.mem[0xd0] = 0x61;
        sensor.mem[0xe1] = 0x3f;
        let mut interface = SpiInterface::new(sensor);
        interface.reset(0, &mut NoopDelay::new()).unwrap();
        let writes_before = interface.spi.page_writes;

        let mut result_buf = [0u8; 1];
        interface.read(0, 0xd0, &mut result_buf).unwrap();
        assert_eq!(result_buf[0], 0x61);
        interface.read(0, 0xe1, &mut result_buf).unwrap();
        assert_eq!(result_buf[0], 0x3f);
        interface.read(0, 0x74, &mut result_buf).unwrap();
        assert_eq!(result_buf[0], 0x55);

        assert_eq!(interface.spi.page_writes - writes_before, 1);
        assert_eq!(interface.memory_page(), Some(MEM_PAGE0));
    }

    #[test]
    fn spi_no_page_switch_within_one_page() {
        let mut interface = SpiInterface::new(PagedSensor::new(0x10));
        let mut result_buf = [0u8; 17];
        interface.read(0, 0x1d, &mut result_buf).unwrap();
        let writes_before = interface.spi.page_writes;

        interface.read(0, 0x50, &mut result_buf[..1]).unwrap();
        interface.write(0, &[0x5a, 0x64], &[0x80, 0x59]).unwrap();
        interface.read(0, 0x74, &mut result_buf[..1]).unwrap();

        assert_eq!(interface.spi.page_writes, writes_before);
        let sensor = interface.release();
        assert_eq!(sensor.mem[0x5a], 0x80);
        assert_eq!(sensor.mem[0x64], 0x59);
    }

    #[test]
    fn spi_write_clears_the_read_bit() {
        let mut interface = SpiInterface::new(PagedSensor::new(0x00));
        interface.reset(0, &mut NoopDelay::new()).unwrap();
        interface.write(0, &[0x74], &[0x49]).unwrap();
        let mut result_buf = [0u8; 1];
        interface.read(0, 0x74, &mut result_buf).unwrap();
        assert_eq!(result_buf[0], 0x49);
        assert_eq!(interface.release().mem[0x74], 0x49);
    }
}
