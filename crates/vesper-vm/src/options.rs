//! VM construction options (spec §4.10), builder-style after the teacher's
//! `vitte_vm::VmOptions`.

use vesper_core::limits::{FRAMES_MAX, STACK_MAX};

#[derive(Debug, Clone, Copy)]
pub struct VmOptions {
    /// Checked once per dispatched instruction; distinct from `frames_max`,
    /// which bounds call depth rather than value-stack depth.
    pub stack_limit: usize,
    pub frames_max: usize,
    /// Forces a full collection before every allocation (spec §4.7's
    /// "stress" mode, used by the GC's own property tests).
    pub stress_gc: bool,
    pub gc_heap_grow_factor: f64,
    /// Gates the dispatch loop's per-instruction trace logging at runtime,
    /// on top of the `trace` Cargo feature that controls whether the
    /// logging code is compiled in at all.
    pub trace: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        VmOptions {
            stack_limit: STACK_MAX,
            frames_max: FRAMES_MAX,
            stress_gc: false,
            gc_heap_grow_factor: 2.0,
            trace: false,
        }
    }
}

impl VmOptions {
    pub fn with_stack_limit(mut self, limit: usize) -> Self {
        self.stack_limit = limit;
        self
    }

    pub fn with_frames_max(mut self, limit: usize) -> Self {
        self.frames_max = limit;
        self
    }

    pub fn with_stress_gc(mut self, on: bool) -> Self {
        self.stress_gc = on;
        self
    }

    pub fn with_gc_heap_grow_factor(mut self, factor: f64) -> Self {
        self.gc_heap_grow_factor = factor;
        self
    }

    pub fn with_trace(mut self, on: bool) -> Self {
        self.trace = on;
        self
    }

    /// Reads `VESPER_STRESS_GC=1` / `VESPER_GC_GROW=<f64>`, in the idiom of
    /// the teacher's `vitte_core::compiler::config::Config::from_env`.
    pub fn from_env() -> Self {
        let mut options = VmOptions::default();
        if std::env::var("VESPER_STRESS_GC").as_deref() == Ok("1") {
            options.stress_gc = true;
        }
        if let Ok(raw) = std::env::var("VESPER_GC_GROW") {
            if let Ok(factor) = raw.parse() {
                options.gc_heap_grow_factor = factor;
            }
        }
        options
    }
}
