// Public Code Generator Port

use crate::domain::error::Result;
use crate::domain::PublicCode;
use rand::Rng;

/// Lowest and highest numeric part handed out by `RandomCodeGenerator`
pub const CODE_RANGE: std::ops::RangeInclusive<u16> = 1000..=9999;

/// Source of candidate public codes. Uniqueness is checked by the caller.
pub trait CodeGenerator: Send + Sync {
    fn next_code(&self) -> Result<PublicCode>;
}

/// Uniform random codes in Q1000..=Q9999 (production)
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn next_code(&self) -> Result<PublicCode> {
        PublicCode::from_number(rand::thread_rng().gen_range(CODE_RANGE))
    }
}

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed list of codes, then repeats the last one
    pub struct ScriptedCodes {
        codes: Mutex<VecDeque<PublicCode>>,
        last: Mutex<Option<PublicCode>>,
    }

    impl ScriptedCodes {
        pub fn new(codes: &[&str]) -> Self {
            let parsed = codes
                .iter()
                .map(|c| PublicCode::parse(c).unwrap())
                .collect();
            Self {
                codes: Mutex::new(parsed),
                last: Mutex::new(None),
            }
        }
    }

    impl CodeGenerator for ScriptedCodes {
        fn next_code(&self) -> Result<PublicCode> {
            let mut codes = self.codes.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            match codes.pop_front() {
                Some(code) => {
                    *last = Some(code.clone());
                    Ok(code)
                }
                None => last.clone().map_or_else(|| PublicCode::parse("Q0000"), Ok),
            }
        }
    }
}
