use mesh_amr::prelude::*;
use std::thread;

struct Constant(f64);

impl CostModel<QuadForest> for Constant {
    fn name(&self) -> &str {
        "constant"
    }
    fn cost(&self, _tree: &QuadForest, _cell: CellId) -> f64 {
        self.0
    }
}

/// Rank 0 refines; rank 1 sits in the hysteresis band and changes nothing,
/// yet must still reshape because the reduced flag is set.
fn run_rank(comm: ThreadComm) -> (usize, AdaptOutcome, f64) {
    let mut forest = QuadForest::new(ForestLayout::with_boxes([2, 1])).unwrap();
    forest.add_variable("p", "pressure").unwrap();
    let ghost = forest.cell_at(0, [0, 0]).unwrap();
    let inner = forest.cell_at(0, [1, 0]).unwrap();
    forest.set_value("p", inner, 5.0).unwrap();

    let criterion = if comm.rank() == 0 {
        Criterion::new("c")
            .with_model(Constant(1.0))
            .with_cmax(0.5)
            .with_max_level(1)
    } else {
        forest.set_boundary(ghost, true);
        Criterion::new("c")
            .with_model(Constant(0.6))
            .with_cmax(1.0)
            .with_cfactor(2.0)
    };
    let mut adaptor = MeshAdaptor::new()
        .with_reshaper(Reshaper::new().with_boundary_conditions(ZeroGradient));
    adaptor.add_criterion(criterion).unwrap();
    let outcome = adaptor.adapt(&mut forest, &comm).unwrap();
    let p = if forest.contains(ghost) {
        forest.value("p", ghost).unwrap()
    } else {
        f64::NAN
    };
    (comm.rank(), outcome, p)
}

#[test]
fn every_partition_reshapes_when_any_changed() {
    let handles: Vec<_> = ThreadComm::group(2)
        .into_iter()
        .map(|comm| thread::spawn(move || run_rank(comm)))
        .collect();
    let mut results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    results.sort_by_key(|r| r.0);

    let (_, refined, _) = results[0];
    assert!(refined.changed);
    assert_eq!(refined.leaves, 8);

    let (_, idle, p) = results[1];
    assert!(idle.changed);
    assert_eq!(idle.created, 0);
    assert_eq!(idle.leaves, 2);
    // the boundary refresh ran on the idle rank
    assert_eq!(p, 5.0);
}

#[test]
fn no_partition_reshapes_when_none_changed() {
    let handles: Vec<_> = ThreadComm::group(3)
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let mut forest = QuadForest::uniform(ForestLayout::default(), 1).unwrap();
                let mut adaptor = MeshAdaptor::new();
                adaptor
                    .add_criterion(
                        Criterion::new("band")
                            .with_model(Constant(0.6))
                            .with_cmax(1.0)
                            .with_cfactor(2.0),
                    )
                    .unwrap();
                adaptor.adapt(&mut forest, &comm).unwrap()
            })
        })
        .collect();
    for h in handles {
        let outcome = h.join().unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.leaves, 4);
    }
}
