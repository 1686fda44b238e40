use crate::config::MappingConfig;
use crate::double_mapper::DoubleMapper;
use crate::event::KeyEvent;
use crate::meta_mapper::MetaMapper;
use crate::single_mapper::SingleMapper;

/// The three-stage mapping pipeline (spec §2): SingleMapper → DoubleMapper →
/// MetaMapper. Each worker owns one `Pipeline` built from its own clone of
/// the shared `MappingConfig`; no state here is shared across workers.
///
/// Mirrors `sm.map(input)` / `dm.map(si)` / `mm.map(di)` composition from the
/// original C implementation this spec was distilled from.
#[derive(Debug, Clone)]
pub struct Pipeline {
    single: SingleMapper,
    double: DoubleMapper,
    meta: MetaMapper,
}

impl Pipeline {
    pub fn new(config: &MappingConfig) -> Self {
        Self {
            single: SingleMapper::new(config.single.clone()),
            double: DoubleMapper::new(config.double.clone()),
            meta: MetaMapper::new(config.meta.clone()),
        }
    }

    /// Run one input `EV_KEY` event through all three stages, returning the
    /// (possibly empty, possibly expanded) sequence of events to emit.
    pub fn apply(&mut self, event: KeyEvent) -> Vec<KeyEvent> {
        let single_out = self.single.apply(event);
        let mut result = Vec::new();
        for double_out in self.double.apply(single_out) {
            result.extend(self.meta.apply(double_out));
        }
        result
    }
}
