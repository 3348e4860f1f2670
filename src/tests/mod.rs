/// Crate-level test suites
///
/// Unit tests live next to the code they cover. The suites here exercise the
/// public surface end to end: algebraic properties of the field operations
/// over random operands, agreement with the serial host arithmetic, and the
/// resource behavior of the device pool as seen through elements.
///
/// Test Organization:
/// - `field_properties`: proptest suites over several field sizes
/// - `resources`: pool exhaustion, recovery and concurrent use
use std::sync::OnceLock;

use crate::config::EngineConfig;
use crate::field::{FieldContext, Mode};

mod field_properties;

/// Field sizes the property suites run over
pub(crate) const FIELD_SIZES: [u32; 4] = [10, 64, 127, 163];

/// Shared, configured contexts, one per entry of `FIELD_SIZES`
pub(crate) fn shared_context(field_size: u32) -> &'static FieldContext {
    static CONTEXTS: OnceLock<Vec<FieldContext>> = OnceLock::new();
    let contexts = CONTEXTS.get_or_init(|| {
        FIELD_SIZES
            .iter()
            .map(|&n| {
                let config = EngineConfig::default().with_pool_capacity(256);
                let mut ctx = FieldContext::new(Mode::Gpu, config).unwrap();
                ctx.set_field_size(n).unwrap();
                ctx
            })
            .collect()
    });
    let index = FIELD_SIZES.iter().position(|&n| n == field_size).unwrap();
    &contexts[index]
}
