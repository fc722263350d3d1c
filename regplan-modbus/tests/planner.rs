//! Integration tests for the Modbus read planner.

use std::collections::BTreeSet;

use regplan_modbus::{
    AddressRange, PlanError, PlannerConfig, ReadPlan, ReadSession, RegisterType,
    merge_address_ranges,
};
use tokio_modbus::{Request, Response};

fn ranges(pairs: &[(u16, u16)]) -> Vec<AddressRange> {
    pairs
        .iter()
        .map(|&(a, c)| AddressRange::new(a, c).expect("valid range"))
        .collect()
}

fn pairs(ranges: &[AddressRange]) -> Vec<(u16, u16)> {
    ranges.iter().map(|r| (r.address(), r.count())).collect()
}

fn addresses(ranges: &[AddressRange]) -> BTreeSet<u16> {
    ranges.iter().flat_map(|r| r.addresses()).collect()
}

/// Small deterministic generator so property checks are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

struct Case {
    input: Vec<AddressRange>,
    allow_holes: bool,
    max_read_size: u16,
}

fn corpus() -> Vec<Case> {
    let mut rng = Lcg(0x5eed);
    (0..500)
        .map(|_| {
            let max_read_size = 1 + rng.below(30) as u16;
            let len = rng.below(20) as usize;
            let input = (0..len)
                .map(|_| {
                    let address = rng.below(300) as u16;
                    let count = 1 + rng.below(max_read_size as u64) as u16;
                    AddressRange::new(address, count).expect("valid range")
                })
                .collect();
            Case {
                input,
                allow_holes: rng.below(2) == 0,
                max_read_size,
            }
        })
        .collect()
}

#[test]
fn test_scenarios() {
    let merge = |input: &[(u16, u16)], allow_holes| {
        pairs(&merge_address_ranges(&ranges(input), allow_holes, 125).expect("merge"))
    };

    assert_eq!(merge(&[(0, 1), (1, 1), (2, 1)], false), vec![(0, 3)]);
    assert_eq!(merge(&[(0, 1), (10, 1)], false), vec![(0, 1), (10, 1)]);
    assert_eq!(merge(&[(0, 1), (10, 1)], true), vec![(0, 11)]);
    assert_eq!(merge(&[(0, 5), (2, 2)], false), vec![(0, 5)]);
    assert_eq!(
        merge(&[(0, 100), (50, 100)], false),
        vec![(0, 100), (100, 50)]
    );
}

#[test]
fn test_coverage_property() {
    for case in corpus() {
        let output = merge_address_ranges(&case.input, case.allow_holes, case.max_read_size)
            .expect("merge");
        let requested = addresses(&case.input);
        let read = addresses(&output);

        assert!(read.is_superset(&requested), "input {:?}", case.input);
        if !case.allow_holes {
            assert_eq!(read, requested, "holes read with allow_holes off");
        }
    }
}

#[test]
fn test_order_and_capacity_property() {
    for case in corpus() {
        let output = merge_address_ranges(&case.input, case.allow_holes, case.max_read_size)
            .expect("merge");

        for read in &output {
            assert!(read.count() <= case.max_read_size, "{} over capacity", read);
        }
        for pair in output.windows(2) {
            assert!(
                pair[0].last_address() < pair[1].first_address(),
                "{} and {} overlap or are out of order",
                pair[0],
                pair[1]
            );
            // Adjacent reads only stay apart when a hole separates them or
            // joining them would not fit in one read.
            let gap = pair[1].first_address() - pair[0].last_address();
            let joined = pair[0].count() as u32 + pair[1].count() as u32;
            if !case.allow_holes {
                assert!(gap > 1 || joined > case.max_read_size as u32);
            }
        }
    }
}

#[test]
fn test_idempotence_property() {
    for case in corpus() {
        let once = merge_address_ranges(&case.input, case.allow_holes, case.max_read_size)
            .expect("merge");
        let twice =
            merge_address_ranges(&once, case.allow_holes, case.max_read_size).expect("re-merge");
        assert_eq!(once, twice, "input {:?}", case.input);
    }
}

#[test]
fn test_holes_never_increase_transactions() {
    for case in corpus() {
        let without = merge_address_ranges(&case.input, false, case.max_read_size).expect("merge");
        let with = merge_address_ranges(&case.input, true, case.max_read_size).expect("merge");
        assert!(with.len() <= without.len(), "input {:?}", case.input);
    }
}

#[test]
fn test_error_cases() {
    assert!(AddressRange::new(0, 0).is_err());
    assert_eq!(
        merge_address_ranges(&ranges(&[(0, 1)]), true, 0),
        Err(PlanError::InvalidCapacity)
    );
    assert!(matches!(
        merge_address_ranges(&ranges(&[(0, 10)]), true, 9),
        Err(PlanError::OversizedRange { count: 10, .. })
    ));
}

#[test]
fn test_example_config_plans() {
    let config = PlannerConfig::from_json5(include_str!("../modbus.example.json5"))
        .expect("example config is valid");

    let meter = ReadPlan::for_device(config.device("meter01").expect("meter01"), &config.modbus)
        .expect("plan meter01");
    assert_eq!(
        meter.requests(),
        vec![
            Request::ReadInputRegisters(0, 54),
            Request::ReadHoldingRegisters(20, 1),
        ]
    );
    assert_eq!(meter.requested_registers(), 15);
    assert_eq!(meter.hole_registers(), 40);

    let boiler = ReadPlan::for_device(config.device("boiler").expect("boiler"), &config.modbus)
        .expect("plan boiler");
    assert_eq!(
        boiler.requests(),
        vec![
            Request::ReadCoils(0, 4),
            Request::ReadDiscreteInputs(9, 1),
            Request::ReadHoldingRegisters(0, 2),
            Request::ReadHoldingRegisters(8, 1),
        ]
    );
    assert_eq!(boiler.hole_registers(), 0);
}

#[test]
fn test_plan_execute_decode_workflow() {
    let config = PlannerConfig::from_json5(include_str!("../modbus.example.json5"))
        .expect("example config is valid");
    let device = config.device("boiler").expect("boiler");
    let plan = ReadPlan::for_device(device, &config.modbus).expect("plan");

    // Stand-in for a transport: answer every request from a fake device.
    let mut session = ReadSession::new();
    for read in plan.reads() {
        let response = match read.request() {
            Request::ReadCoils(_, n) => Response::ReadCoils(vec![true; n as usize]),
            Request::ReadDiscreteInputs(_, n) => {
                Response::ReadDiscreteInputs(vec![false; n as usize])
            }
            Request::ReadHoldingRegisters(address, n) => {
                Response::ReadHoldingRegisters((address..address + n).map(|a| 200 + a).collect())
            }
            other => panic!("unexpected request {:?}", other),
        };
        session.record_response(read, &response).expect("record");
    }

    let registers = device.all_registers(&config.modbus.register_groups);
    let value = |name: &str| {
        let register = registers
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
            .expect("register");
        session.decode(register, device.zero_mode).expect("decode")
    };

    assert!((value("setpoint")[0] - 20.0).abs() < 1e-9);
    assert!((value("flow_temp")[0] - 20.1).abs() < 1e-9);
    assert!((value("pressure")[0] - 2.08).abs() < 1e-9);
    assert_eq!(value("relays"), vec![1.0; 4]);
    assert_eq!(value("alarm"), vec![0.0]);
    assert_eq!(session.len(), 4 + 1 + 3);
    assert!(session.get(RegisterType::Holding, 5).is_none());
}
