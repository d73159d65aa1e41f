//! Randomized checks that the hybrid program predicts exactly what the tree does.
//!
//! Trees, sample counts and inputs come from seeded ChaCha8 generators so
//! every run sees the same cases.

use bumpalo::Bump;
use mixtree::codegen::{Comparison, GeneratorConfig, HybridCompiler, Stmt, DEFAULT_BUDGET};
use mixtree::core::CompilationSession;
use mixtree::target::{Architecture, CostModel};
use mixtree::tree::{FeatureType, NodeId, NodeKind, Tree, TreeBuilder};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const DIM: u32 = 5;

/// Grow a random subtree, returning its root and sample count.
fn grow(builder: &mut TreeBuilder, rng: &mut ChaCha8Rng, depth: u32, max_depth: u32, float: bool) -> (NodeId, u64) {
    if depth == max_depth || (depth > 0 && rng.gen_bool(0.25)) {
        let samples = rng.gen_range(0..50u64);
        let leaf = builder.leaf(rng.gen_range(0..10));
        builder.set_samples(leaf, samples);
        return (leaf, samples);
    }

    let (left, left_samples) = grow(builder, rng, depth + 1, max_depth, float);
    let (right, right_samples) = grow(builder, rng, depth + 1, max_depth, float);
    // Eighths are exact in f32, so float and double comparisons agree.
    let threshold = if float {
        f64::from(rng.gen_range(-80..80i32)) / 8.0
    } else {
        f64::from(rng.gen_range(-20..20i32))
    };
    let split = builder.split(rng.gen_range(0..DIM), threshold, left, right);
    let samples = left_samples + right_samples;
    builder.set_samples(split, samples);
    (split, samples)
}

fn random_tree(seed: u64, max_depth: u32, float: bool) -> Tree {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let feature_type = if float { FeatureType::Float } else { FeatureType::Int };
    let mut builder = TreeBuilder::new(format!("rand{}", seed), DIM, feature_type);
    let (head, _) = grow(&mut builder, &mut rng, 0, max_depth, float);
    let mut tree = builder.build(head).unwrap();
    tree.annotate_path_probabilities();
    tree
}

/// Random inputs plus inputs sitting exactly on every threshold.
fn inputs(tree: &Tree, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ 0x5eed);
    let mut inputs: Vec<Vec<f64>> = (0..200)
        .map(|_| (0..DIM).map(|_| f64::from(rng.gen_range(-96..96i32)) / 8.0).collect())
        .collect();
    for (_, split) in tree.splits() {
        let mut on_threshold: Vec<f64> = (0..DIM).map(|_| f64::from(rng.gen_range(-20..20i32))).collect();
        on_threshold[split.feature as usize] = split.threshold;
        inputs.push(on_threshold);
    }
    inputs
}

fn budgets(tree: &Tree, arch: Architecture) -> Vec<u32> {
    let total = CostModel::for_tree(arch, tree).total_cost(tree);
    vec![0, 1, 40, 100, total / 3, total / 2, total.saturating_sub(1), total, DEFAULT_BUDGET]
}

/// Every inlined split puts its more probable child in the then arm.
fn assert_branch_order(tree: &Tree, stmt: &Stmt<'_>) {
    if let Stmt::Branch {
        node,
        comparison,
        then_arm,
        else_arm,
        ..
    } = stmt
    {
        let split = tree.node(*node).split().unwrap();
        let left = tree.node(split.left).path_prob();
        let right = tree.node(split.right).path_prob();
        match comparison {
            Comparison::LessEqual => assert!(left >= right, "node {}", node),
            Comparison::Greater => assert!(right > left, "node {}", node),
        }
        assert_branch_order(tree, then_arm);
        assert_branch_order(tree, else_arm);
    }
}

#[test]
fn test_predict_matches_evaluate() {
    let _ = env_logger::builder().is_test(true).try_init();

    for seed in 0..24u64 {
        let float = seed % 2 == 1;
        let tree = random_tree(seed, 3 + (seed % 5) as u32, float);
        let cases = inputs(&tree, seed);

        for arch in Architecture::ALL {
            let arena = Bump::new();
            let session = CompilationSession::new(&arena);
            for budget in budgets(&tree, arch) {
                let compiler = HybridCompiler::new(GeneratorConfig::new(arch).with_budget(budget));
                let program = compiler.lower(&session, &tree, 0).unwrap();
                for features in &cases {
                    assert_eq!(
                        program.predict(features),
                        tree.evaluate(features),
                        "seed {} arch {} budget {} input {:?}",
                        seed,
                        arch,
                        budget,
                        features
                    );
                }
            }
        }
    }
}

#[test]
fn test_table_is_complete_for_any_kernel() {
    for seed in 100..116u64 {
        let tree = random_tree(seed, 6, seed % 2 == 0);
        for kernel_size in [1, 2, 3, 8, 10, 64] {
            let config = GeneratorConfig::new(Architecture::Intel)
                .with_budget(0)
                .with_kernel_size(kernel_size)
                .unwrap();
            let arena = Bump::new();
            let session = CompilationSession::new(&arena);
            let program = HybridCompiler::new(config).lower(&session, &tree, 0).unwrap();
            let table = program.table();

            assert_eq!(table.len(), tree.node_count());
            assert_eq!(table.index_of(tree.head()), Some(0));

            let mut seen = vec![false; table.len()];
            for node in tree.nodes() {
                let idx = table.index_of(node.id()).unwrap() as usize;
                assert!(!seen[idx], "index {} assigned twice", idx);
                seen[idx] = true;

                let entry = &table.entries()[idx];
                match node.kind() {
                    NodeKind::Leaf { prediction } => {
                        assert!(entry.is_leaf);
                        assert_eq!(entry.prediction, *prediction);
                    }
                    NodeKind::Split(split) => {
                        assert!(!entry.is_leaf);
                        assert_eq!(Some(entry.left_child), table.index_of(split.left));
                        assert_eq!(Some(entry.right_child), table.index_of(split.right));
                    }
                }
            }

            for features in inputs(&tree, seed) {
                assert_eq!(table.walk(0, &features), tree.evaluate(&features));
            }
        }
    }
}

#[test]
fn test_branch_order_and_budget_bounds() {
    for seed in 200..220u64 {
        let tree = random_tree(seed, 7, seed % 3 == 0);
        for arch in Architecture::ALL {
            let total = CostModel::for_tree(arch, &tree).total_cost(&tree);
            let arena = Bump::new();
            let session = CompilationSession::new(&arena);
            for budget in budgets(&tree, arch) {
                let compiler = HybridCompiler::new(GeneratorConfig::new(arch).with_budget(budget));
                let program = compiler.lower(&session, &tree, 0).unwrap();
                assert_branch_order(&tree, program.body());
                assert!(program.inline_size() <= budget);

                if tree.node(tree.head()).is_leaf() {
                    assert_eq!(program.fallback_sites(), 0);
                } else if budget >= total {
                    assert_eq!(program.fallback_sites(), 0);
                    assert_eq!(program.inline_size(), total);
                }
            }
        }
    }
}
