// BME680 / BME688 register map, masks and timings

#![allow(nonstandard_style)]
pub const BME68X_CHIP_ID: u8 = 0x61; // value of REG_CHIP_ID for every BME68x

pub const REG_CHIP_ID: u8 = 0xd0;
pub const REG_VARIANT_ID: u8 = 0xf0; // 0x00 = gas low (BME680), 0x01 = gas high (BME688)
pub const REG_SOFT_RESET: u8 = 0xe0;
pub const CMD_SOFT_RESET: u8 = 0xb6;

// calibration data lives in three windows, read back to back into one 42 byte array
pub const REG_COEFF1: u8 = 0x8a;
pub const REG_COEFF2: u8 = 0xe1;
pub const REG_COEFF3: u8 = 0x00;
pub const LEN_COEFF1: usize = 23;
pub const LEN_COEFF2: usize = 14;
pub const LEN_COEFF3: usize = 5;
pub const LEN_COEFF_ALL: usize = LEN_COEFF1 + LEN_COEFF2 + LEN_COEFF3;

// heater profile registers, one per profile slot, this driver only uses slot 0
pub const REG_IDAC_HEAT0: u8 = 0x50;
pub const REG_RES_HEAT0: u8 = 0x5a;
pub const REG_GAS_WAIT0: u8 = 0x64;

pub const REG_CTRL_GAS_0: u8 = 0x70;
pub const REG_CTRL_GAS_1: u8 = 0x71; // start of the 5 byte config window 0x71..=0x75
pub const REG_CTRL_HUM: u8 = 0x72;
pub const REG_MEM_PAGE_LOW: u8 = 0x73; // unused on I2C, memory page register on SPI
pub const REG_CTRL_MEAS: u8 = 0x74;
pub const REG_CONFIG: u8 = 0x75;
pub const LEN_CONFIG: usize = 5;

pub const REG_MEAS_STATUS_0: u8 = 0x1d; // field data blocks follow every LEN_FIELD bytes
pub const LEN_FIELD: usize = 17;
pub const LEN_FIELD_OFFSET: u8 = 17;
pub const FIELD_READ_ATTEMPTS: u8 = 5;

// status / field data masks
pub const NEW_DATA_MSK: u8 = 0x80;
pub const GAS_INDEX_MSK: u8 = 0x0f;
pub const GAS_RANGE_MSK: u8 = 0x0f;
pub const GASM_VALID_MSK: u8 = 0x20;
pub const HEAT_STAB_MSK: u8 = 0x10;

pub const MODE_MSK: u8 = 0x03;

// ctrl_gas_0 / ctrl_gas_1 field values
pub const ENABLE_HEATER: u8 = 0x00;
pub const DISABLE_HEATER: u8 = 0x01;
pub const ENABLE_GAS_MEAS_H: u8 = 0x02;
pub const ENABLE_GAS_MEAS_L: u8 = 0x01;
pub const DISABLE_GAS_MEAS: u8 = 0x00;

pub const VARIANT_GAS_HIGH: u8 = 0x01;

// SPI framing
pub const REG_MEM_PAGE: u8 = 0xf3;
pub const MEM_PAGE_MSK: u8 = 0x10;
pub const MEM_PAGE0: u8 = 0x10; // registers 0x00..=0x7f
pub const MEM_PAGE1: u8 = 0x00; // registers 0x80..=0xff, selected after reset
pub const SPI_RD_MSK: u8 = 0x80;
pub const SPI_WR_MSK: u8 = 0x7f;

/// size of the (register, value) interleave buffer, a write carries at most half this many registers
pub const LEN_INTERLEAVE_BUFF: usize = 20;

// conversion timing, all in µs
pub const MEAS_OFFSET_US: u32 = 1963; // per oversampling cycle
pub const MEAS_DUR_US: u32 = 1908; // TPH switching
pub const GAS_DUR_US: u32 = 2385; // gas measurement
pub const WAKE_UP_DUR_US: u32 = 1000;
pub const PERIOD_RESET_US: u32 = 10_000;
pub const PERIOD_POLL_US: u32 = 10_000; // default poll period

// gas wait encoding
pub const GAS_WAIT_MAX_MS: u16 = 0xfc0;
pub const GAS_WAIT_SATURATED: u8 = 0xff;

pub const HEATER_MAX_TEMP_C: u16 = 400;

// defaults
pub const DEFAULT_HEATER_TEMP_C: u16 = 320;
pub const DEFAULT_HEATER_DURATION_MS: u16 = 150;
pub const DEFAULT_AMBIENT_TEMP_C: i8 = 25;

pub const STANDARD_SEA_LEVEL_HPA: f32 = 1013.25;


#[repr(u8)]
/// BME68x I2C device address, selected by the SDO pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAddress {
    /// SDO to GND
    Primary = 0x76,
    /// SDO to VDDIO, the usual breakout board wiring
    Secondary = 0x77,
}

impl From<DeviceAddress> for u8 {
    fn from(value: DeviceAddress) -> Self {
        match value {
            DeviceAddress::Primary => 0x76,
            DeviceAddress::Secondary => 0x77,
        }
    }
}

impl Default for DeviceAddress {
    fn default() -> Self {
        Self::Secondary
    }
}
