use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Gf2nError {
    #[error("Device pool exhausted: all {capacity} slots are in use")]
    PoolExhausted { capacity: usize },

    #[error("Error: The called method {0} does not exist!")]
    OperationNotFound(String),

    #[error("Wrong polynomial size: expected {expected} chunks, got {got}")]
    WrongPolynomialSize { expected: usize, got: usize },

    #[error("Wrong polynomial degree for GF(2^{field_size}): got degree {degree}")]
    WrongPolynomialDegree { field_size: u32, degree: i64 },

    /// Reserved for backends that cannot run a registered operation. The
    /// emulated device runs all of them, and `div` reports `None` instead.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Mode {0} not found")]
    ModeNotFound(String),

    #[error("Division by zero: the zero element has no inverse")]
    DivisionByZero,

    #[error("Elements belong to different field configurations")]
    FieldMismatch,

    #[error("Field size has not been configured")]
    FieldNotConfigured,

    #[error("Invalid field size: {0}")]
    InvalidFieldSize(u32),

    #[error("Invalid decimal value: {0}")]
    InvalidDecimal(String),

    #[error("Invalid buffer length: at most {max} allowed, got {got}")]
    InvalidBufferLength { max: usize, got: usize },

    #[error("Value with {bits} significant bits does not fit GF(2^{field_size})")]
    ValueOutOfField { field_size: u32, bits: u64 },

    #[error("Invalid launch configuration: {0}")]
    InvalidLaunchConfig(String),

    #[error("Device out of memory: requested {requested} bytes, {available} available")]
    DeviceOutOfMemory { requested: usize, available: usize },

    #[error("Device fault: {0}")]
    DeviceFault(String),

    #[error("Element has no device-resident value")]
    ElementReleased,

    #[error("Invalid value {value:?} for property {name}")]
    InvalidProperty { name: String, value: String },

    #[error("Unknown session slot: {0}")]
    UnknownSlot(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, Gf2nError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Gf2nError::OperationNotFound("parFoo".to_string()).to_string(),
            "Error: The called method parFoo does not exist!"
        );
        assert_eq!(
            Gf2nError::UnsupportedOperation("div".to_string()).to_string(),
            "Unsupported operation: div"
        );
        assert_eq!(
            Gf2nError::PoolExhausted { capacity: 20 }.to_string(),
            "Device pool exhausted: all 20 slots are in use"
        );
    }
}
