//! Fabricates a loadable classifier artifact with deterministic seed
//! weights, so the gateway can be exercised without the trained model file.

use clap::Parser;
use model::{
    Activation, Dense, DenseConfig, Dropout, DropoutConfig, GlobalAveragePooling1D, InputSpec,
    Network, PatchEmbedding, PatchEmbeddingConfig, PatchSize,
};
use ndarray::{Array1, Array2};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Generate a stroke-classifier artifact with seed weights")]
struct Args {
    /// Output path for the artifact
    #[arg(short, long, default_value = "models/stroke_vit.nnet")]
    output: PathBuf,

    /// Patch side length
    #[arg(long, default_value_t = 16)]
    patch_size: usize,

    /// Embedding width
    #[arg(long, default_value_t = 128)]
    embed_dim: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let input = InputSpec {
        height: 224,
        width: 224,
        channels: 3,
    };
    let patch_dim = args.patch_size * args.patch_size * input.channels;

    let mut rng = SplitMix::new(0x5eed);
    let projection_scale = 1.0 / (patch_dim as f32).sqrt();
    let head_scale = 1.0 / (args.embed_dim as f32).sqrt();

    let config = PatchEmbeddingConfig {
        patch_size: PatchSize::Square(args.patch_size),
        embed_dim: args.embed_dim,
    };
    let mut embedding = PatchEmbedding::configure("patch_embedding", config)?;
    embedding.bind([input.height, input.width, input.channels])?;
    embedding.attach(
        Array2::from_shape_fn((patch_dim, args.embed_dim), |_| {
            rng.next_weight() * projection_scale
        }),
        Array1::zeros(args.embed_dim),
    )?;

    let head = Dense::new(
        "classifier",
        DenseConfig {
            units: 1,
            activation: Activation::Sigmoid,
        },
        Array2::from_shape_fn((args.embed_dim, 1), |_| rng.next_weight() * head_scale),
        Array1::zeros(1),
    )?;

    let network = Network::new(
        input,
        vec![
            Box::new(embedding),
            Box::new(GlobalAveragePooling1D::new("encoder_pool")),
            Box::new(Dropout::new("head_dropout", DropoutConfig { rate: 0.1 })),
            Box::new(head),
        ],
    );

    if let Some(parent) = args.output.parent() {
        fs::create_dir_all(parent)?;
    }
    network.save(&args.output)?;

    println!(
        "Wrote {} ({} layers, patch {}x{}, embed_dim {})",
        args.output.display(),
        network.depth(),
        args.patch_size,
        args.patch_size,
        args.embed_dim
    );

    Ok(())
}

/// SplitMix64 folded down to f32 in [-0.5, 0.5). Deterministic, so two runs
/// write byte-identical artifacts.
struct SplitMix {
    state: u64,
}

impl SplitMix {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_weight(&mut self) -> f32 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 40) as f32 / (1u64 << 24) as f32 - 0.5
    }
}
