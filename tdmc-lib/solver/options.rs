use clap::ValueEnum;

/// Preferred layout for introduce-forget solution tables. Joins always
/// rewrite their full assignment space and therefore produce arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DataStructure {
    Array,
    Tree,
}

/// Knobs of a single solve.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone)]
pub struct SolveConfig {
    /// Table layout for introduce-forget bags.
    pub data_structure: DataStructure,
    /// Force the weighted path even when the formula carries no weights.
    pub weighted: bool,
    /// Emit a trace event per kernel launch.
    pub do_trace: bool,
    /// Upper bound on the number of variables per bag; wider bags are a
    /// capacity error.
    pub max_bag: usize,
    /// Bytes available per table fragment; bags whose dense table would
    /// exceed this are chunked.
    pub max_memory_buffer: usize,
}

impl Default for SolveConfig {
    fn default() -> Self {
        SolveConfig {
            data_structure: DataStructure::Tree,
            weighted: false,
            do_trace: false,
            max_bag: 61,
            max_memory_buffer: 1 << 30,
        }
    }
}

impl SolveConfig {
    #[must_use]
    pub fn builder() -> SolveConfigBuilder {
        SolveConfigBuilder {
            config: SolveConfig::default(),
        }
    }
}

#[allow(clippy::module_name_repetitions)]
pub struct SolveConfigBuilder {
    config: SolveConfig,
}

impl SolveConfigBuilder {
    #[must_use]
    pub fn data_structure(mut self, data_structure: DataStructure) -> Self {
        self.config.data_structure = data_structure;
        self
    }

    #[must_use]
    pub fn weighted(mut self, weighted: bool) -> Self {
        self.config.weighted = weighted;
        self
    }

    #[must_use]
    pub fn do_trace(mut self, do_trace: bool) -> Self {
        self.config.do_trace = do_trace;
        self
    }

    #[must_use]
    pub fn max_bag(mut self, max_bag: usize) -> Self {
        self.config.max_bag = max_bag;
        self
    }

    #[must_use]
    pub fn max_memory_buffer(mut self, bytes: usize) -> Self {
        self.config.max_memory_buffer = bytes;
        self
    }

    #[must_use]
    pub fn build(self) -> SolveConfig {
        self.config
    }
}
