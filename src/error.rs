use core::fmt;

/// BME68x driver errors, `E` is the error type of the bus (I2C or SPI)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// a bus transaction failed
    Bus(Operation, E),
    /// a bus transaction failed while running a multi step operation
    Failed(Step, Operation, E),
    /// chip id did not read back as 0x61, holds the id that was read
    NotConnected(u8),
    /// bounded mode change gave up before the sensor reported sleep
    SleepTimeout,
}

impl<E> Error<E> {
    /// tag a bus error with the step it happened in, an already tagged error keeps its step
    pub(crate) fn during(self, step: Step) -> Self {
        match self {
            Error::Bus(operation, source) => Error::Failed(step, operation, source),
            other => other,
        }
    }

    /// the bus error underneath, if there is one
    pub fn bus_error(&self) -> Option<&E> {
        match self {
            Error::Bus(_, source) | Error::Failed(_, _, source) => Some(source),
            _ => None,
        }
    }

    pub fn step(&self) -> Option<Step> {
        match self {
            Error::Failed(step, _, _) => Some(*step),
            _ => None,
        }
    }
}

/// register level action that was running when the bus failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Reset,
    ReadChipId,
    ReadVariantId,
    ReadCalibration,
    ReadMode,
    WriteMode,
    ReadConfig,
    WriteConfig,
    WriteHeater,
    ReadGasControl,
    WriteGasControl,
    ReadFieldData,
    ReadHeaterReadback,
}

/// multi step operations whose failures are tagged with their name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Handshake,
    ApplyConfig,
    ApplyGasConfig,
    SetMode,
    Read,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Reset => "soft reset",
            Operation::ReadChipId => "read chip id",
            Operation::ReadVariantId => "read variant id",
            Operation::ReadCalibration => "read calibration data",
            Operation::ReadMode => "read power mode",
            Operation::WriteMode => "write power mode",
            Operation::ReadConfig => "read config registers",
            Operation::WriteConfig => "write config registers",
            Operation::WriteHeater => "write heater profile",
            Operation::ReadGasControl => "read gas control",
            Operation::WriteGasControl => "write gas control",
            Operation::ReadFieldData => "read field data",
            Operation::ReadHeaterReadback => "read heater readback",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Handshake => "handshake",
            Step::ApplyConfig => "apply config",
            Step::ApplyGasConfig => "apply gas config",
            Step::SetMode => "set mode",
            Step::Read => "read",
        };
        f.write_str(name)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(operation, source) => write!(f, "failed to {}: {:?}", operation, source),
            Error::Failed(step, operation, source) => {
                write!(f, "failed to {}: failed to {}: {:?}", step, operation, source)
            }
            Error::NotConnected(chip_id) => {
                write!(f, "device not found or not connected, chip id {:#04x}", chip_id)
            }
            Error::SleepTimeout => f.write_str("sensor did not report sleep mode"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn during_tags_bus_errors_once() {
        let error: Error<u8> = Error::Bus(Operation::ReadConfig, 7);
        let tagged = error.during(Step::ApplyConfig);
        assert_eq!(tagged, Error::Failed(Step::ApplyConfig, Operation::ReadConfig, 7));

        // the handshake wrapping an apply config failure keeps the inner step
        let retagged = tagged.during(Step::Handshake);
        assert_eq!(retagged.step(), Some(Step::ApplyConfig));
        assert_eq!(retagged.bus_error(), Some(&7));
    }

    #[test]
    fn not_connected_is_not_a_bus_error() {
        let error: Error<u8> = Error::NotConnected(0x60);
        assert_eq!(error.during(Step::Handshake), Error::NotConnected(0x60));
        assert_eq!(error.bus_error(), None);
    }
}
