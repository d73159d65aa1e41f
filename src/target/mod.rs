// This module describes the two target instruction-set families mixtree generates code for.
// Architecture is parsed from its configuration name and is the single place where an
// unsupported target is rejected, so a generator can never be constructed for anything other
// than arm or intel. Each architecture fixes the kernel size used by the table packer (how
// many entries one greedy run may lay out contiguously, sized to the target's locality
// quantum) and selects the rows of the instruction-size cost table in the cost submodule.

//! Target architectures and their cost model.

pub mod cost;

pub use cost::{CostModel, CostTable, OperandType};

use crate::core::{CompileError, CompileResult};
use std::fmt;
use std::str::FromStr;

/// Target instruction-set family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    Arm,
    Intel,
}

impl Architecture {
    pub const ALL: [Architecture; 2] = [Architecture::Arm, Architecture::Intel];

    /// Configuration name of the architecture.
    pub const fn name(self) -> &'static str {
        match self {
            Architecture::Arm => "arm",
            Architecture::Intel => "intel",
        }
    }

    /// Maximum number of entries one packing run lays out contiguously.
    pub const fn kernel_size(self) -> usize {
        match self {
            Architecture::Arm => 8,
            Architecture::Intel => 10,
        }
    }
}

impl FromStr for Architecture {
    type Err = CompileError;

    fn from_str(s: &str) -> CompileResult<Self> {
        match s {
            "arm" => Ok(Architecture::Arm),
            "intel" => Ok(Architecture::Intel),
            _ => Err(CompileError::UnsupportedArchitecture { name: s.to_string() }),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_supported() {
        for arch in Architecture::ALL {
            assert_eq!(arch.name().parse::<Architecture>(), Ok(arch));
        }
    }

    #[test]
    fn test_parse_unsupported() {
        for name in ["risc-v", "ARM", "x86", ""] {
            assert_eq!(
                name.parse::<Architecture>(),
                Err(CompileError::UnsupportedArchitecture { name: name.to_string() })
            );
        }
    }

    #[test]
    fn test_kernel_sizes() {
        assert_eq!(Architecture::Arm.kernel_size(), 8);
        assert_eq!(Architecture::Intel.kernel_size(), 10);
    }
}
