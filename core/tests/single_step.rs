//! Single-step tests: each fixture sets up a full core and memory state,
//! executes exactly one instruction, and compares the resulting state to
//! the expected one.

use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, BoolFromInt};

use thumbcore::{Bus, CortexM0, FlatRam};

/// Generate a separate test fn per fixture file, so every suite shows up
/// on its own when running tests via cargo.
macro_rules! single_step_suites {
    ($($suite:ident),+ $(,)?) => {
        $(
            paste::paste! {
                #[test]
                fn [<single_step_ $suite>]() {
                    run_suite(stringify!($suite));
                }
            }
        )+
    };
}

single_step_suites! { alu, shift, memory, stack, branch }

/// Run every case of one fixture file. On failure the full initial,
/// expected, and actual states are dumped; seeing the whole picture beats
/// guessing from a single mismatched field.
fn run_suite(suite: &str) {
    for case in load_cases(suite) {
        let (mut core, mut bus) = case.initial_state.build();

        core.step(&mut bus)
            .unwrap_or_else(|err| panic!("case {}: {err}", case.name));

        let addrs: Vec<u32> = case.final_state.ram.iter().map(|(addr, _)| *addr).collect();
        let result = State::capture(&core, &mut bus, &addrs);

        assert!(
            case.final_state == result,
            "case {}\n  initial: {:?}\n  expected: {:?}\n  result: {:?}",
            &case.name,
            &case.initial_state,
            &case.final_state,
            &result,
        );
    }
}

fn load_cases(suite: &str) -> Vec<TestCase> {
    let path = format!("tests/data/{suite}.json");
    let json = fs::read(Path::new(&path)).unwrap_or_else(|_| panic!("could not load \"{path}\""));

    serde_json::from_slice(&json).unwrap()
}

/// One fixture: a name, the state to start from, and the state expected
/// after a single step.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct TestCase {
    name: String,

    #[serde(rename = "initial")]
    initial_state: State,

    #[serde(rename = "final")]
    final_state: State,
}

/// A complete architectural state plus the memory words a case cares
/// about. Flags are 0/1 in the JSON.
#[serde_as]
#[derive(Clone, Default, Deserialize, Eq, PartialEq, Serialize)]
struct State {
    /// All sixteen registers, r0 through r12, then SP, LR, PC.
    r: Vec<u32>,

    #[serde_as(as = "BoolFromInt")]
    n: bool,

    #[serde_as(as = "BoolFromInt")]
    z: bool,

    #[serde_as(as = "BoolFromInt")]
    c: bool,

    #[serde_as(as = "BoolFromInt")]
    v: bool,

    /// Word-aligned (address, value) pairs; on the initial state these are
    /// written to memory (including the instruction itself), on the final
    /// state they are the words to read back and compare.
    ram: Vec<(u32, u32)>,
}

impl State {
    fn build(&self) -> (CortexM0, FlatRam) {
        assert_eq!(self.r.len(), 16, "fixture must list all 16 registers");

        let mut core = CortexM0::new("sst", 0, 0);
        core.r.copy_from_slice(&self.r);
        core.apsr.set_n(self.n);
        core.apsr.set_z(self.z);
        core.apsr.set_c(self.c);
        core.apsr.set_v(self.v);

        let mut bus = FlatRam::new();
        for &(addr, value) in &self.ram {
            bus.write_w(addr, value);
        }

        (core, bus)
    }

    fn capture(core: &CortexM0, bus: &mut FlatRam, ram_addrs: &[u32]) -> Self {
        Self {
            r: core.r.to_vec(),
            n: core.apsr.n(),
            z: core.apsr.z(),
            c: core.apsr.c(),
            v: core.apsr.v(),
            ram: ram_addrs
                .iter()
                .map(|&addr| (addr, bus.read_w(addr)))
                .collect(),
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State {{")?;
        write!(f, "\tregs {{ ")?;

        for (i, value) in self.r.iter().enumerate() {
            write!(f, "r{i}:{value:08X} ")?;
        }

        write!(f, "n:{} ", self.n as usize)?;
        write!(f, "z:{} ", self.z as usize)?;
        write!(f, "c:{} ", self.c as usize)?;
        write!(f, "v:{} ", self.v as usize)?;

        writeln!(f, "}}")?;
        write!(f, "\tram {{ ")?;

        for (addr, value) in &self.ram {
            write!(f, "{addr:08X}:{value:08X} ")?;
        }

        writeln!(f, "}}")?;
        write!(f, "}}")
    }
}
