// Submit images to the processing pipeline and poll for their results
use image_pipeline::{ImageNormalizer, ImagePipeline, PipelineConfig, TaskStatus};
use ndarray::Array2;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Image Processing Pipeline - Submit & Poll");
    println!("=========================================\n");

    let config = PipelineConfig::from_env()?;
    let pipeline = ImagePipeline::new(config, Arc::new(image_pipeline::ClassicalTransform::new()))?;

    // Optional image path on the command line, synthetic gradients otherwise
    let mut images: Vec<Array2<f64>> = Vec::new();
    if let Some(path) = std::env::args().nth(1) {
        images.push(ImageNormalizer::default().from_path(path)?);
    }
    for i in 0..8 {
        images.push(Array2::from_shape_fn((128, 128), |(r, c)| {
            ((r * (i + 1) + c) % 128) as f64 / 127.0
        }));
    }

    let ids: Vec<String> = images
        .into_iter()
        .map(|image| pipeline.submit(image, None))
        .collect::<Result<_, _>>()?;
    println!("[OK] Submitted {} images\n", ids.len());

    let deadline = Instant::now() + Duration::from_secs(30);
    for id in &ids {
        loop {
            match pipeline.get_result(id) {
                TaskStatus::Complete(result) => {
                    println!(
                        "{}: {} in {:.3}s, edge quality {:.3}",
                        id,
                        result.status.as_str(),
                        result.processing_duration_secs,
                        result.edge_quality().unwrap_or_default()
                    );
                    break;
                }
                TaskStatus::Evicted => {
                    println!("{}: evicted", id);
                    break;
                }
                TaskStatus::Pending if Instant::now() > deadline => {
                    println!("{}: still pending, giving up", id);
                    break;
                }
                TaskStatus::Pending => thread::sleep(Duration::from_millis(10)),
            }
        }
    }

    println!("\n{}", serde_json::to_string_pretty(&pipeline.get_stats())?);
    pipeline.shutdown()?;
    println!("Library version: {}", image_pipeline::version());
    Ok(())
}
