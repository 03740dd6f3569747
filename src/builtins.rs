// the static registry of gate and control builtins. the compiler checks
// call arity against this table; the engine dispatches on the variant and
// uses `reverse` to roll a gate back during step-back.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    VectorSize,
    Decoherence,
    Hadamard,
    SigmaX,
    SigmaY,
    SigmaZ,
    Rx,
    Ry,
    Rz,
    Unitary,
    CNot,
    Swap,
    Toffoli,
    Phase,
    CPhase,
    QftCPhase,
    InvQftCPhase,
    Qft,
    InvQft,
    ExpModN,
    RevExpModN,
    ShiftLeft,
    ShiftRight,
    MeasureBit,
    Measure,
    Print,
    Breakpoint,
    Delay,
    Display,
    SetViewAngle,
    SetViewMode,
}

pub const ALL_BUILTINS: [Builtin; 31] = [
    Builtin::VectorSize,
    Builtin::Decoherence,
    Builtin::Hadamard,
    Builtin::SigmaX,
    Builtin::SigmaY,
    Builtin::SigmaZ,
    Builtin::Rx,
    Builtin::Ry,
    Builtin::Rz,
    Builtin::Unitary,
    Builtin::CNot,
    Builtin::Swap,
    Builtin::Toffoli,
    Builtin::Phase,
    Builtin::CPhase,
    Builtin::QftCPhase,
    Builtin::InvQftCPhase,
    Builtin::Qft,
    Builtin::InvQft,
    Builtin::ExpModN,
    Builtin::RevExpModN,
    Builtin::ShiftLeft,
    Builtin::ShiftRight,
    Builtin::MeasureBit,
    Builtin::Measure,
    Builtin::Print,
    Builtin::Breakpoint,
    Builtin::Delay,
    Builtin::Display,
    Builtin::SetViewAngle,
    Builtin::SetViewMode,
];

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        ALL_BUILTINS.iter().copied().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::VectorSize => "VectorSize",
            Builtin::Decoherence => "Decoherence",
            Builtin::Hadamard => "Hadamard",
            Builtin::SigmaX => "SigmaX",
            Builtin::SigmaY => "SigmaY",
            Builtin::SigmaZ => "SigmaZ",
            Builtin::Rx => "Rx",
            Builtin::Ry => "Ry",
            Builtin::Rz => "Rz",
            Builtin::Unitary => "Unitary",
            Builtin::CNot => "CNot",
            Builtin::Swap => "Swap",
            Builtin::Toffoli => "Toffoli",
            Builtin::Phase => "Phase",
            Builtin::CPhase => "CPhase",
            Builtin::QftCPhase => "QFTCPhase",
            Builtin::InvQftCPhase => "InvQFTCPhase",
            Builtin::Qft => "QFT",
            Builtin::InvQft => "InvQFT",
            Builtin::ExpModN => "ExpModN",
            Builtin::RevExpModN => "RevExpModN",
            Builtin::ShiftLeft => "ShiftLeft",
            Builtin::ShiftRight => "ShiftRight",
            Builtin::MeasureBit => "MeasureBit",
            Builtin::Measure => "Measure",
            Builtin::Print => "Print",
            Builtin::Breakpoint => "Breakpoint",
            Builtin::Delay => "Delay",
            Builtin::Display => "Display",
            Builtin::SetViewAngle => "SetViewAngle",
            Builtin::SetViewMode => "SetViewMode",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::Measure | Builtin::Breakpoint => 0,
            Builtin::VectorSize
            | Builtin::Decoherence
            | Builtin::Hadamard
            | Builtin::SigmaX
            | Builtin::SigmaY
            | Builtin::SigmaZ
            | Builtin::ShiftLeft
            | Builtin::ShiftRight
            | Builtin::MeasureBit
            | Builtin::Print
            | Builtin::Delay
            | Builtin::Display
            | Builtin::SetViewAngle
            | Builtin::SetViewMode => 1,
            Builtin::Rx
            | Builtin::Ry
            | Builtin::Rz
            | Builtin::CNot
            | Builtin::Swap
            | Builtin::Phase
            | Builtin::QftCPhase
            | Builtin::InvQftCPhase
            | Builtin::Qft
            | Builtin::InvQft => 2,
            Builtin::Toffoli | Builtin::CPhase | Builtin::ExpModN | Builtin::RevExpModN => 3,
            Builtin::Unitary => 9,
        }
    }

    /// true for builtins that act on the amplitude vector (or the measured
    /// value); the engine records these in the undo log.
    pub fn touches_state(self) -> bool {
        !matches!(
            self,
            Builtin::Print
                | Builtin::Breakpoint
                | Builtin::Delay
                | Builtin::Display
                | Builtin::SetViewAngle
                | Builtin::SetViewMode
        )
    }

    /// the builtin and argument vector that undo this gate, or none when
    /// the gate has no reverse.
    pub fn reverse(self, args: &[f64]) -> Option<(Builtin, Vec<f64>)> {
        match self {
            Builtin::Phase => Some((Builtin::Phase, vec![args[0], -args[1]])),
            Builtin::CPhase => Some((Builtin::CPhase, vec![args[0], args[1], -args[2]])),
            Builtin::QftCPhase => Some((Builtin::InvQftCPhase, args.to_vec())),
            Builtin::InvQftCPhase => Some((Builtin::QftCPhase, args.to_vec())),
            Builtin::Qft => Some((Builtin::InvQft, args.to_vec())),
            Builtin::InvQft => Some((Builtin::Qft, args.to_vec())),
            Builtin::ShiftLeft => Some((Builtin::ShiftRight, args.to_vec())),
            Builtin::ShiftRight => Some((Builtin::ShiftLeft, args.to_vec())),
            Builtin::Rx => Some((Builtin::Rx, vec![args[0], -args[1]])),
            Builtin::Ry => Some((Builtin::Ry, vec![args[0], -args[1]])),
            Builtin::Rz => Some((Builtin::Rz, vec![args[0], -args[1]])),
            Builtin::Hadamard
            | Builtin::SigmaX
            | Builtin::SigmaY
            | Builtin::SigmaZ
            | Builtin::CNot
            | Builtin::Swap
            | Builtin::Toffoli
            | Builtin::Unitary => Some((self, args.to_vec())),
            _ => None,
        }
    }
}
