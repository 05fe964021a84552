//! Source keys: a (function, bytecode offset, resume mode) triple naming the
//! bytecode site an array was allocated at or consumed by.

use std::fmt;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct FuncId(pub u32);

impl FuncId {
    pub const INVALID: FuncId = FuncId(0);
}

/// How a frame at this source key resumes. Profiling canonicalizes this away
/// so generator and plain invocations of the same source aggregate together.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[repr(u8)]
pub enum ResumeMode {
    None = 0,
    Async = 1,
    GenIter = 2,
}

impl ResumeMode {
    fn from_bits(bits: u8) -> ResumeMode {
        match bits {
            1 => ResumeMode::Async,
            2 => ResumeMode::GenIter,
            _ => ResumeMode::None,
        }
    }
}

/// Bytecode opcodes, to the extent the array profiler needs to see them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum OpCode {
    NewVec,
    NewDict,
    NewKeyset,
    IsTypeStruct,
    GetElem,
    SetElem,
    AppendElem,
    IterInit,
    Ret,
}

impl OpCode {
    pub fn name(self) -> &'static str {
        match self {
            OpCode::NewVec => "NewVec",
            OpCode::NewDict => "NewDict",
            OpCode::NewKeyset => "NewKeyset",
            OpCode::IsTypeStruct => "IsTypeStruct",
            OpCode::GetElem => "GetElem",
            OpCode::SetElem => "SetElem",
            OpCode::AppendElem => "AppendElem",
            OpCode::IterInit => "IterInit",
            OpCode::Ret => "Ret",
        }
    }

    /// True for the opcodes that materialize an array literal.
    pub fn is_array_literal(self) -> bool {
        matches!(self, OpCode::NewVec | OpCode::NewDict | OpCode::NewKeyset)
    }
}

struct FuncData {
    name: String,
    ops: Vec<OpCode>,
}

static FUNCS: Lazy<RwLock<Vec<FuncData>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Register a function body. Ids are stable for the process lifetime.
pub fn register_func(name: &str, ops: Vec<OpCode>) -> FuncId {
    let mut funcs = FUNCS.write();
    funcs.push(FuncData {
        name: name.to_owned(),
        ops,
    });
    FuncId(funcs.len() as u32)
}

fn with_func<R>(id: FuncId, f: impl FnOnce(&FuncData) -> R) -> Option<R> {
    if id == FuncId::INVALID {
        return None;
    }
    let funcs = FUNCS.read();
    funcs.get((id.0 - 1) as usize).map(f)
}

/// A source location. The empty key (invalid function) stands in for "no
/// frame" wherever a sink cannot be resolved.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SrcKey {
    func: FuncId,
    offset: u32,
    resume: ResumeMode,
}

impl SrcKey {
    pub fn new(func: FuncId, offset: u32, resume: ResumeMode) -> SrcKey {
        SrcKey {
            func,
            offset,
            resume,
        }
    }

    pub fn empty() -> SrcKey {
        SrcKey {
            func: FuncId::INVALID,
            offset: 0,
            resume: ResumeMode::None,
        }
    }

    pub fn valid(&self) -> bool {
        self.func != FuncId::INVALID
    }

    pub fn func(&self) -> FuncId {
        self.func
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn resume_mode(&self) -> ResumeMode {
        self.resume
    }

    /// The same source with resume mode forced to `None`. All stored keys
    /// are canonical.
    pub fn canonical(self) -> SrcKey {
        SrcKey {
            resume: ResumeMode::None,
            ..self
        }
    }

    /// Key for the next instruction in the same function.
    pub fn advanced(self) -> SrcKey {
        SrcKey {
            offset: self.offset + 1,
            ..self
        }
    }

    pub fn op(&self) -> Option<OpCode> {
        with_func(self.func, |f| f.ops.get(self.offset as usize).copied()).flatten()
    }

    pub fn to_bits(self) -> u64 {
        ((self.func.0 as u64) << 32) | ((self.offset as u64) << 2) | self.resume as u64
    }

    pub fn from_bits(bits: u64) -> SrcKey {
        SrcKey {
            func: FuncId((bits >> 32) as u32),
            offset: ((bits >> 2) & 0x3fff_ffff) as u32,
            resume: ResumeMode::from_bits((bits & 0x3) as u8),
        }
    }

    /// Human-readable symbol for reports.
    pub fn symbol(&self) -> String {
        match with_func(self.func, |f| f.name.clone()) {
            Some(name) => format!("{}() @ {}", name, self.offset),
            None => "<unknown>".to_owned(),
        }
    }

    /// Rendering of the instruction at this key.
    pub fn show_inst(&self) -> String {
        match self.op() {
            Some(op) => format!("bc {}: {}", self.offset, op.name()),
            None => "bc ?: <invalid>".to_owned(),
        }
    }
}

impl fmt::Debug for SrcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SrcKey({}, {}, {:?})", self.func.0, self.offset, self.resume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_round_trip() {
        let func = register_func("round_trip", vec![OpCode::NewDict, OpCode::Ret]);
        let sk = SrcKey::new(func, 1, ResumeMode::Async);
        let back = SrcKey::from_bits(sk.to_bits());
        assert_eq!(back, sk);
        assert_eq!(back.canonical().resume_mode(), ResumeMode::None);
    }

    #[test]
    fn test_canonical_keys_compare_equal() {
        let func = register_func("canon", vec![OpCode::NewVec]);
        let a = SrcKey::new(func, 0, ResumeMode::GenIter).canonical();
        let b = SrcKey::new(func, 0, ResumeMode::None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_key() {
        let sk = SrcKey::empty();
        assert!(!sk.valid());
        assert_eq!(sk.symbol(), "<unknown>");
        assert_eq!(sk.op(), None);
    }
}
