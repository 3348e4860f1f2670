//! Named operation registry
//!
//! Benchmarking call sites select kernel strategies by name. Each name maps
//! to a variant of `BinaryOperation` or `ScalarOperation`, and each variant
//! to a plain function pointer on `Element`, so a lookup is a table scan and
//! a call, and a miss reports the exact name that was asked for.

use std::fmt;
use std::str::FromStr;

use crate::element::Element;
use crate::error::{Gf2nError, Result};

type BinaryHandler = fn(&Element, &Element) -> Result<Option<Element>>;
type ScalarHandler = fn(&Element, u64) -> Result<Option<Element>>;

/// Operations taking a second element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperation {
    Add,
    Sub,
    Mul,
    Div,
    ParAdd,
    ParAddLoop,
    ParAddTime,
    ParAddWithEvents,
    ParAddOwnStream,
    ParAddOwnStream1024Threads,
    ParAddOwnStream512Threads,
    ParAddOwnStream256Threads,
    ParAddOwnStream128Threads,
    ParAdd2OwnStream,
    ParAdd4OwnStream,
    ParAdd8OwnStream,
    ParAddSharedMem,
    ParMul,
    ParMulChunkedBarRed,
    MeasureKernelLaunchOverhead,
}

impl BinaryOperation {
    pub const ALL: [BinaryOperation; 20] = [
        BinaryOperation::Add,
        BinaryOperation::Sub,
        BinaryOperation::Mul,
        BinaryOperation::Div,
        BinaryOperation::ParAdd,
        BinaryOperation::ParAddLoop,
        BinaryOperation::ParAddTime,
        BinaryOperation::ParAddWithEvents,
        BinaryOperation::ParAddOwnStream,
        BinaryOperation::ParAddOwnStream1024Threads,
        BinaryOperation::ParAddOwnStream512Threads,
        BinaryOperation::ParAddOwnStream256Threads,
        BinaryOperation::ParAddOwnStream128Threads,
        BinaryOperation::ParAdd2OwnStream,
        BinaryOperation::ParAdd4OwnStream,
        BinaryOperation::ParAdd8OwnStream,
        BinaryOperation::ParAddSharedMem,
        BinaryOperation::ParMul,
        BinaryOperation::ParMulChunkedBarRed,
        BinaryOperation::MeasureKernelLaunchOverhead,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryOperation::Add => "add",
            BinaryOperation::Sub => "sub",
            BinaryOperation::Mul => "mul",
            BinaryOperation::Div => "div",
            BinaryOperation::ParAdd => "parAdd",
            BinaryOperation::ParAddLoop => "parAddLoop",
            BinaryOperation::ParAddTime => "parAddTime",
            BinaryOperation::ParAddWithEvents => "parAddWithEvents",
            BinaryOperation::ParAddOwnStream => "parAddOwnStream",
            BinaryOperation::ParAddOwnStream1024Threads => "parAddOwnStream1024Threads",
            BinaryOperation::ParAddOwnStream512Threads => "parAddOwnStream512Threads",
            BinaryOperation::ParAddOwnStream256Threads => "parAddOwnStream256Threads",
            BinaryOperation::ParAddOwnStream128Threads => "parAddOwnStream128Threads",
            BinaryOperation::ParAdd2OwnStream => "parAdd2OwnStream",
            BinaryOperation::ParAdd4OwnStream => "parAdd4OwnStream",
            BinaryOperation::ParAdd8OwnStream => "parAdd8OwnStream",
            BinaryOperation::ParAddSharedMem => "parAddSharedMem",
            BinaryOperation::ParMul => "parMul",
            BinaryOperation::ParMulChunkedBarRed => "parMulChunkedBarRed",
            BinaryOperation::MeasureKernelLaunchOverhead => "measureKernelLaunchOverhead",
        }
    }

    /// # Returns
    /// * `Result<Self>` - The operation, or `OperationNotFound` carrying `name`
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| Gf2nError::OperationNotFound(name.to_string()))
    }

    fn handler(self) -> BinaryHandler {
        match self {
            BinaryOperation::Add | BinaryOperation::ParAdd => |a, b| a.par_add(b).map(Some),
            BinaryOperation::Sub => |a, b| a.sub(b).map(Some),
            BinaryOperation::Mul | BinaryOperation::ParMul => |a, b| a.par_mul(b).map(Some),
            BinaryOperation::Div => |a, b| Ok(a.div(b)),
            BinaryOperation::ParAddLoop => |a, b| a.par_add_loop(b).map(Some),
            BinaryOperation::ParAddTime => |a, b| a.par_add_time(b).map(Some),
            BinaryOperation::ParAddWithEvents => |a, b| a.par_add_with_events(b).map(Some),
            BinaryOperation::ParAddOwnStream => |a, b| a.par_add_own_stream(b, 0).map(Some),
            BinaryOperation::ParAddOwnStream1024Threads => |a, b| a.par_add_own_stream(b, 1024).map(Some),
            BinaryOperation::ParAddOwnStream512Threads => |a, b| a.par_add_own_stream(b, 512).map(Some),
            BinaryOperation::ParAddOwnStream256Threads => |a, b| a.par_add_own_stream(b, 256).map(Some),
            BinaryOperation::ParAddOwnStream128Threads => |a, b| a.par_add_own_stream(b, 128).map(Some),
            BinaryOperation::ParAdd2OwnStream => |a, b| a.par_add_multi_stream(b, 2).map(Some),
            BinaryOperation::ParAdd4OwnStream => |a, b| a.par_add_multi_stream(b, 4).map(Some),
            BinaryOperation::ParAdd8OwnStream => |a, b| a.par_add_multi_stream(b, 8).map(Some),
            BinaryOperation::ParAddSharedMem => |a, b| a.par_add_shared_mem(b).map(Some),
            BinaryOperation::ParMulChunkedBarRed => |a, b| a.par_mul_chunked(b).map(Some),
            BinaryOperation::MeasureKernelLaunchOverhead => {
                |a, b| a.measure_kernel_launch_overhead(b).map(Some)
            }
        }
    }

    /// Applies the operation to `a` and `b`
    pub fn run(self, a: &Element, b: &Element) -> Result<Option<Element>> {
        tracing::trace!(operation = self.name(), "dispatch");
        (self.handler())(a, b)
    }
}

/// Operations taking an unsigned scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarOperation {
    Exp,
    Inverse,
    ParExponentiation,
    ParInverseElement,
    ParInverseElementWithExp,
}

impl ScalarOperation {
    pub const ALL: [ScalarOperation; 5] = [
        ScalarOperation::Exp,
        ScalarOperation::Inverse,
        ScalarOperation::ParExponentiation,
        ScalarOperation::ParInverseElement,
        ScalarOperation::ParInverseElementWithExp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalarOperation::Exp => "exp",
            ScalarOperation::Inverse => "inverse",
            ScalarOperation::ParExponentiation => "parExponentiation",
            ScalarOperation::ParInverseElement => "parInverseElement",
            ScalarOperation::ParInverseElementWithExp => "parInverseElementWithExp",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| Gf2nError::OperationNotFound(name.to_string()))
    }

    // Inversion ignores the scalar.
    fn handler(self) -> ScalarHandler {
        match self {
            ScalarOperation::Exp | ScalarOperation::ParExponentiation => {
                |a, k| a.par_exponentiation(k).map(Some)
            }
            ScalarOperation::Inverse | ScalarOperation::ParInverseElement => {
                |a, _| a.par_inverse_element().map(Some)
            }
            ScalarOperation::ParInverseElementWithExp => |a, _| a.par_inverse_element_with_exp().map(Some),
        }
    }

    pub fn run(self, a: &Element, value: u64) -> Result<Option<Element>> {
        tracing::trace!(operation = self.name(), value, "dispatch");
        (self.handler())(a, value)
    }
}

impl FromStr for BinaryOperation {
    type Err = Gf2nError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl FromStr for ScalarOperation {
    type Err = Gf2nError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for BinaryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ScalarOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::field::{FieldContext, Mode};

    #[test]
    fn test_names_round_trip() {
        for op in BinaryOperation::ALL {
            assert_eq!(op.name().parse::<BinaryOperation>().unwrap(), op);
        }
        for op in ScalarOperation::ALL {
            assert_eq!(ScalarOperation::from_name(&op.to_string()).unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_name_is_reported() {
        let err = BinaryOperation::from_name("parAddTurbo").unwrap_err();
        assert_eq!(err, Gf2nError::OperationNotFound("parAddTurbo".to_string()));
        assert_eq!(err.to_string(), "Error: The called method parAddTurbo does not exist!");

        // scalar names are not binary names and vice versa
        assert!(BinaryOperation::from_name("parExponentiation").is_err());
        assert!(ScalarOperation::from_name("parMul").is_err());
    }

    #[test]
    fn test_every_binary_variant_agrees() {
        let mut ctx = FieldContext::new(Mode::Gpu, EngineConfig::default().with_pool_capacity(8)).unwrap();
        ctx.set_field_size(163).unwrap();
        let a = ctx.element_from_decimal("123456789123456789123456789").unwrap();
        let b = ctx.element_from_decimal("987654321987654321").unwrap();

        let sum = a.add(&b).unwrap().to_decimal().unwrap();
        let product = a.mul(&b).unwrap().to_decimal().unwrap();

        for op in BinaryOperation::ALL {
            let result = a.run_with_element(op.name(), &b).unwrap();
            let expected = match op {
                BinaryOperation::Div => None,
                BinaryOperation::Mul | BinaryOperation::ParMul | BinaryOperation::ParMulChunkedBarRed => {
                    Some(product.clone())
                }
                BinaryOperation::MeasureKernelLaunchOverhead => Some(a.to_decimal().unwrap()),
                _ => Some(sum.clone()),
            };
            assert_eq!(result.map(|e| e.to_decimal().unwrap()), expected, "{}", op);
        }
    }

    #[test]
    fn test_scalar_variants() {
        let mut ctx = FieldContext::new(Mode::Gpu, EngineConfig::default()).unwrap();
        ctx.set_field_size(32).unwrap();
        let a = ctx.element_from_decimal("3141592653").unwrap();
        let one = ctx.one().unwrap().to_decimal().unwrap();

        let euclid = a.run_with_value("parInverseElement", 0).unwrap().unwrap();
        let fermat = a.run_with_value("parInverseElementWithExp", 99).unwrap().unwrap();
        assert_eq!(euclid.to_decimal().unwrap(), fermat.to_decimal().unwrap());
        assert_eq!(a.mul(&euclid).unwrap().to_decimal().unwrap(), one);

        let cube = a.run_with_value("exp", 3).unwrap().unwrap();
        let expected = a.mul(&a).unwrap().mul(&a).unwrap();
        assert_eq!(cube.to_decimal().unwrap(), expected.to_decimal().unwrap());

        assert!(matches!(
            a.run_with_value("parSqrt", 2),
            Err(Gf2nError::OperationNotFound(name)) if name == "parSqrt"
        ));
    }
}
