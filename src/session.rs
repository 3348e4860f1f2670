//! Benchmarking session
//!
//! A `Session` bundles a field context with the three operand slots a
//! benchmarking driver works with: two inputs (`bn_a`, `bn_b`) and the last
//! result (`res`). Drivers create a session, configure the field, run an
//! operation by name a number of times and then read the result and its
//! metrics back through the slot names.

use std::fmt;
use std::str::FromStr;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::config::{FLAG_REUSE_OPERANDS, FLAG_SCALAR_OP};
use crate::element::Element;
use crate::error::{Gf2nError, Result};
use crate::field::FieldContext;
use crate::geometry::ChunkGeometry;
use crate::polynomial::PolynomialSource;

/// Seed of the random polynomial used by `set_dummy_parameters`
pub const DUMMY_POLYNOMIAL_SEED: u64 = 23;

/// Seeds of the random operands created by `run`
pub const OPERAND_SEEDS: [u64; 2] = [42, 84];

/// Operand slots of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
    Result,
}

impl Slot {
    pub fn name(self) -> &'static str {
        match self {
            Slot::A => "bn_a",
            Slot::B => "bn_b",
            Slot::Result => "res",
        }
    }
}

impl FromStr for Slot {
    type Err = Gf2nError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bn_a" => Ok(Slot::A),
            "bn_b" => Ok(Slot::B),
            "res" => Ok(Slot::Result),
            _ => Err(Gf2nError::UnknownSlot(s.to_string())),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field context plus operand slots
pub struct Session {
    context: FieldContext,
    bn_a: Option<Element>,
    bn_b: Option<Element>,
    res: Option<Element>,
}

impl Session {
    /// Opens a session for the named mode (`cuda`, `gpu` or `device`)
    pub fn create(mode: &str) -> Result<Self> {
        Ok(Self {
            context: FieldContext::create(mode)?,
            bn_a: None,
            bn_b: None,
            res: None,
        })
    }

    pub fn context(&self) -> &FieldContext {
        &self.context
    }

    /// Configures the field with its standard polynomial
    pub fn set_field_size(&mut self, field_size: u32) -> Result<()> {
        self.clear();
        self.context.set_field_size(field_size)
    }

    /// Configures the field with a given polynomial, or a seeded random one
    pub fn set_dummy_parameters(&mut self, field_size: u32, polynomial: Option<PolynomialSource<'_>>) -> Result<()> {
        self.clear();
        let source = polynomial.unwrap_or(PolynomialSource::Random {
            seed: DUMMY_POLYNOMIAL_SEED,
        });
        self.context.set_polynomial(field_size, source)
    }

    /// Runs `op` `runs` times and returns each run's `creation` time in ms
    ///
    /// # Arguments
    /// * `op` - Operation name, binary or scalar depending on `flags`
    /// * `value` - Scalar operand for scalar operations
    /// * `field_size` - Bit size of the random operands
    /// * `flags` - `FLAG_REUSE_OPERANDS`, `FLAG_ASYNC`, `FLAG_SCALAR_OP`
    /// * `runs` - Number of repetitions
    ///
    /// # Returns
    /// * `Result<Vec<f64>>` - One timing per run; `div` runs report zero
    pub fn run(&mut self, op: &str, value: u64, field_size: u32, flags: u32, runs: usize) -> Result<Vec<f64>> {
        self.context.set_flags(flags);

        let reuse = flags & FLAG_REUSE_OPERANDS != 0 && self.bn_a.is_some() && self.bn_b.is_some();
        if !reuse {
            let a = Self::random_number(field_size, OPERAND_SEEDS[0])?;
            let b = Self::random_number(field_size, OPERAND_SEEDS[1])?;
            // Release the old operands before acquiring new slots.
            self.bn_a = None;
            self.bn_b = None;
            self.bn_a = Some(self.context.element_from_bytes(&a)?);
            self.bn_b = Some(self.context.element_from_bytes(&b)?);
        }

        let (a, b) = match (&self.bn_a, &self.bn_b) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(Gf2nError::FieldNotConfigured),
        };

        let scalar = flags & FLAG_SCALAR_OP != 0;
        let mut timings = Vec::with_capacity(runs);
        for _ in 0..runs {
            self.res = None;
            let result = if scalar {
                a.run_with_value(op, value)?
            } else {
                a.run_with_element(op, b)?
            };
            timings.push(result.as_ref().map_or(0.0, |r| r.metric("creation_time")));
            self.res = result;
        }

        tracing::debug!(op, runs, flags, "session run finished");
        Ok(timings)
    }

    /// Value of the last result, `ceil(field_size / 8)` big-endian bytes
    pub fn result_bytes(&self) -> Result<Vec<u8>> {
        self.res
            .as_ref()
            .ok_or_else(|| Gf2nError::InvalidParameters("no result available".to_string()))?
            .get_value()
    }

    pub fn element(&self, slot: Slot) -> Option<&Element> {
        match slot {
            Slot::A => self.bn_a.as_ref(),
            Slot::B => self.bn_b.as_ref(),
            Slot::Result => self.res.as_ref(),
        }
    }

    /// Metrics report of a slot; empty for an empty slot
    pub fn metrics(&self, slot: &str) -> Result<String> {
        let slot: Slot = slot.parse()?;
        Ok(self
            .element(slot)
            .map(Element::metrics_report)
            .unwrap_or_default())
    }

    /// One metric of a slot in ms; zero for an empty slot or unknown name
    pub fn metric(&self, slot: &str, name: &str) -> Result<f64> {
        let slot: Slot = slot.parse()?;
        Ok(self.element(slot).map_or(0.0, |e| e.metric(name)))
    }

    /// Sets a launch property on the element in a slot
    pub fn set_property(&mut self, slot: &str, name: &str, value: &str) -> Result<()> {
        let element = match slot.parse()? {
            Slot::A => self.bn_a.as_mut(),
            Slot::B => self.bn_b.as_mut(),
            Slot::Result => self.res.as_mut(),
        };
        match element {
            Some(element) => element.set_property(name, value),
            None => Ok(()),
        }
    }

    /// `ceil(bits / 8)` seeded random big-endian bytes below `2^bits`
    pub fn random_number(bits: u32, seed: u64) -> Result<Vec<u8>> {
        let geometry = ChunkGeometry::new(bits)?;
        let len = geometry.value_len();
        let mut bytes = vec![0u8; len];
        ChaCha20Rng::seed_from_u64(seed).fill_bytes(&mut bytes);

        let excess = len * 8 - bits as usize;
        bytes[0] &= 0xff >> excess;
        Ok(bytes)
    }

    /// Drops all elements and the field context
    pub fn destroy(self) {}

    fn clear(&mut self) {
        self.res = None;
        self.bn_a = None;
        self.bn_b = None;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("context", &self.context)
            .field("bn_a", &self.bn_a)
            .field("bn_b", &self.bn_b)
            .field("res", &self.res)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FLAG_ASYNC;
    use crate::reference::HostField;

    #[test]
    fn test_random_number() {
        let bytes = Session::random_number(12, 42).unwrap();
        assert_eq!(bytes.len(), 2);
        assert_eq!(bytes[0] & 0xf0, 0);
        assert_eq!(bytes, Session::random_number(12, 42).unwrap());
        assert_eq!(Session::random_number(64, 1).unwrap().len(), 8);
        assert!(Session::random_number(0, 1).is_err());
    }

    #[test]
    fn test_slots() {
        assert_eq!("res".parse::<Slot>().unwrap(), Slot::Result);
        assert_eq!(
            "bn_c".parse::<Slot>(),
            Err(Gf2nError::UnknownSlot("bn_c".to_string()))
        );
    }

    #[test]
    fn test_binary_run() {
        let mut session = Session::create("cuda").unwrap();
        session.set_field_size(100).unwrap();

        let timings = session.run("parMul", 0, 100, 0, 3).unwrap();
        assert_eq!(timings.len(), 3);
        assert!(timings.iter().all(|t| *t >= 0.0));

        let a = Session::random_number(100, 42).unwrap();
        let b = Session::random_number(100, 84).unwrap();
        let poly = session.context().polynomial().unwrap().chunks().to_vec();
        let geometry = session.context().geometry().unwrap();
        let oracle = HostField::new(&poly);
        let expected = oracle.mul(
            &geometry.chunks_from_bytes(&a).unwrap(),
            &geometry.chunks_from_bytes(&b).unwrap(),
        );
        assert_eq!(session.result_bytes().unwrap(), geometry.value_bytes(&expected));

        let report = session.metrics("res").unwrap();
        assert!(report.starts_with("copy_to_device="));
        assert_eq!(session.metric("bn_a", "bogus").unwrap(), 0.0);
        assert!(session.metrics("nothing").is_err());
    }

    #[test]
    fn test_scalar_run_and_reuse() {
        let mut session = Session::create("gpu").unwrap();
        session.set_field_size(64).unwrap();
        session.run("parInverseElement", 0, 64, FLAG_SCALAR_OP, 1).unwrap();
        let euclid = session.result_bytes().unwrap();

        session
            .run("parInverseElementWithExp", 0, 64, FLAG_SCALAR_OP | FLAG_REUSE_OPERANDS, 1)
            .unwrap();
        assert_eq!(session.result_bytes().unwrap(), euclid);

        session.set_property("bn_a", "num_threads", "64").unwrap();
        assert_eq!(
            session.element(Slot::A).unwrap().launch_properties().num_threads,
            64
        );
        session.run("parAddLoop", 0, 64, FLAG_REUSE_OPERANDS | FLAG_ASYNC, 2).unwrap();
        assert_eq!(session.result_bytes().unwrap().len(), 8);

        assert!(matches!(
            session.run("parFoo", 0, 64, FLAG_REUSE_OPERANDS, 1),
            Err(Gf2nError::OperationNotFound(name)) if name == "parFoo"
        ));
        session.destroy();
    }

    #[test]
    fn test_async_flag_applies_per_run() {
        let mut session = Session::create("gpu").unwrap();
        session.set_field_size(64).unwrap();

        session.run("add", 0, 64, FLAG_ASYNC, 1).unwrap();
        assert!(session.context().config().async_transfers);

        session.run("add", 0, 64, 0, 1).unwrap();
        assert!(!session.context().config().async_transfers);
        assert!(session.metric("bn_a", "copy_to_device").unwrap() > 0.0);
        assert_eq!(session.result_bytes().unwrap().len(), 8);
    }

    #[test]
    fn test_dummy_parameters_and_div() {
        let mut session = Session::create("device").unwrap();
        session.set_dummy_parameters(40, None).unwrap();
        let timings = session.run("div", 0, 40, 0, 2).unwrap();
        assert_eq!(timings, vec![0.0, 0.0]);
        assert!(session.result_bytes().is_err());

        session
            .set_dummy_parameters(10, Some(PolynomialSource::Decimal("1033")))
            .unwrap();
        session.run("add", 0, 10, 0, 1).unwrap();
        assert_eq!(session.result_bytes().unwrap().len(), 2);
    }
}
