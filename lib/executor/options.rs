use serde::{Deserialize, Serialize};
use std::default;

/// Various options that change the behavior of the interpreter.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Options {
    is_32bit: bool,
    max_stack_depth: usize,
    max_steps: usize,
    max_allocation: usize,
    init_locals: Option<bool>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            is_32bit: false,
            max_stack_depth: 1024,
            max_steps: 10_000,
            max_allocation: 0x10_0000,
            init_locals: None,
        }
    }
}

impl Options {
    /// Create a new set of Options with the default settings.
    pub fn new() -> Options {
        Options::default()
    }

    /// Whether pointers and native integers are 32 bits wide. By default they
    /// are 64 bits wide.
    pub fn is_32bit(&self) -> bool {
        self.is_32bit
    }

    pub fn set_is_32bit(&mut self, is_32bit: bool) {
        self.is_32bit = is_32bit;
    }

    /// The deepest the operand stack may grow. Pushing past it is an invalid
    /// program.
    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    pub fn set_max_stack_depth(&mut self, max_stack_depth: usize) {
        self.max_stack_depth = max_stack_depth;
    }

    /// How many instructions `Driver::run` executes before giving up.
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn set_max_steps(&mut self, max_steps: usize) {
        self.max_steps = max_steps;
    }

    /// The largest array length or `localloc` size which is materialized.
    /// Larger allocations produce unknown references.
    pub fn max_allocation(&self) -> usize {
        self.max_allocation
    }

    pub fn set_max_allocation(&mut self, max_allocation: usize) {
        self.max_allocation = max_allocation;
    }

    /// Overrides the method body's `init_locals` flag when set.
    pub fn init_locals(&self) -> Option<bool> {
        self.init_locals
    }

    pub fn set_init_locals(&mut self, init_locals: Option<bool>) {
        self.init_locals = init_locals;
    }
}

/// Create your options with the builder pattern.
///
/// For more details on the options, see `executor::Options`
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Create a new builder for interpreter options.
    pub fn new() -> OptionsBuilder {
        OptionsBuilder {
            options: Options::default(),
        }
    }

    pub fn is_32bit(mut self, is_32bit: bool) -> OptionsBuilder {
        self.options.is_32bit = is_32bit;
        self
    }

    pub fn max_stack_depth(mut self, max_stack_depth: usize) -> OptionsBuilder {
        self.options.max_stack_depth = max_stack_depth;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> OptionsBuilder {
        self.options.max_steps = max_steps;
        self
    }

    pub fn max_allocation(mut self, max_allocation: usize) -> OptionsBuilder {
        self.options.max_allocation = max_allocation;
        self
    }

    /// Force locals to be zero-initialized, or left unknown, whatever the
    /// method body says.
    pub fn init_locals(mut self, init_locals: bool) -> OptionsBuilder {
        self.options.init_locals = Some(init_locals);
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

impl default::Default for OptionsBuilder {
    fn default() -> OptionsBuilder {
        OptionsBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let options = OptionsBuilder::new().is_32bit(true).max_steps(12).init_locals(false).build();

        assert!(options.is_32bit());
        assert_eq!(options.max_steps(), 12);
        assert_eq!(options.max_stack_depth(), 1024);
        assert_eq!(options.init_locals(), Some(false));
        assert_eq!(Options::new().init_locals(), None);
    }
}
