//! Factory calibration coefficients.
//!
//! The BME68x stores its trimming values in three non-contiguous NVM windows
//! (0x8a..=0xa0, 0xe1..=0xee, 0x00..=0x04). The driver reads them back to back
//! into one 42 byte array and decodes that array here.

use crate::constants::LEN_COEFF_ALL;

/// calibration coefficients as stored in NVM, signedness per the Bosch datasheet
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CalibrationPars {
    pub par_t1: u16,
    pub par_t2: i16,
    pub par_t3: i8,

    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: u8,

    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: u8,
    pub par_h7: i8,

    pub par_gh1: i8,
    pub par_gh2: i16,
    pub par_gh3: i8,

    /// heater resistance range, 2 bits
    pub res_heat_range: u8,
    pub res_heat_val: i8,
    /// gas range switching error, only used by the gas low variant
    pub range_sw_err: i8,
}

fn concat_u16(msb: u8, lsb: u8) -> u16 {
    ((msb as u16) << 8) | lsb as u16
}

fn concat_i16(msb: u8, lsb: u8) -> i16 {
    concat_u16(msb, lsb) as i16
}

impl CalibrationPars {
    /// decode the 42 calibration bytes
    pub fn from_raw(coeff: &[u8; LEN_COEFF_ALL]) -> Self {
        CalibrationPars {
            par_t1: concat_u16(coeff[32], coeff[31]),
            par_t2: concat_i16(coeff[1], coeff[0]),
            par_t3: coeff[2] as i8,

            par_p1: concat_u16(coeff[5], coeff[4]),
            par_p2: concat_i16(coeff[7], coeff[6]),
            par_p3: coeff[8] as i8,
            par_p4: concat_i16(coeff[11], coeff[10]),
            par_p5: concat_i16(coeff[13], coeff[12]),
            par_p6: coeff[15] as i8,
            par_p7: coeff[14] as i8,
            par_p8: concat_i16(coeff[19], coeff[18]),
            par_p9: concat_i16(coeff[21], coeff[20]),
            par_p10: coeff[22],

            // h1 and h2 share the nibbles of byte 24
            par_h1: ((coeff[25] as u16) << 4) | (coeff[24] & 0x0f) as u16,
            par_h2: ((coeff[23] as u16) << 4) | (coeff[24] >> 4) as u16,
            par_h3: coeff[26] as i8,
            par_h4: coeff[27] as i8,
            par_h5: coeff[28] as i8,
            par_h6: coeff[29],
            par_h7: coeff[30] as i8,

            par_gh1: coeff[35] as i8,
            par_gh2: concat_i16(coeff[34], coeff[33]),
            par_gh3: coeff[36] as i8,

            res_heat_range: (coeff[39] & 0x30) >> 4,
            res_heat_val: coeff[37] as i8,
            range_sw_err: ((coeff[41] & 0xf0) as i8) / 16,
        }
    }
}
