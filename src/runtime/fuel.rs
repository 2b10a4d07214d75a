//! Instruction budget for a slice of execution.

/// One unit of fuel pays for one instruction.
///
/// A [`Machine`](crate::Machine) stops at the end of the instruction that
/// exhausts its fuel, or before the next one once interrupted, and can be
/// resumed with a refilled budget.
#[derive(Debug, Clone)]
pub struct Fuel {
    fuel: i32,
    interrupted: bool,
}

impl Fuel {
    pub fn empty() -> Self {
        Self::with(0)
    }

    pub fn with(fuel: i32) -> Self {
        Self {
            fuel,
            interrupted: false,
        }
    }

    /// Credits `fuel`, capped at `max_fuel`, and clears the interrupt flag.
    ///
    /// Meant to be called by the host between two [`Machine::step`]s.
    ///
    /// [`Machine::step`]: crate::Machine::step
    pub fn refill(&mut self, fuel: i32, max_fuel: i32) {
        self.fuel = self.fuel.saturating_add(fuel).min(max_fuel);
        self.interrupted = false;
    }

    pub fn consume(&mut self, fuel: i32) {
        self.fuel = self.fuel.saturating_sub(fuel);
    }

    pub fn remaining(&self) -> i32 {
        self.fuel
    }

    /// Stops the machine before its next instruction without consuming fuel.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn should_continue(&self) -> bool {
        self.fuel > 0 && !self.interrupted
    }
}
