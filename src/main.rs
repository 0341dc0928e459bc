use framegraph::core::{EventType, Frame};
use framegraph::{ModuleRegistry, Pipeline, PipelineConfig};
use std::time::Duration;

const STREAMS: [&str; 2] = ["cam1", "cam2"];
const FRAMES_PER_STREAM: usize = 5;

fn demo_config() -> serde_json::Value {
    // source fans out to two branches that join again at the sink
    serde_json::json!({
        "nodes": [
            {"id": "source", "type": "Passthrough"},
            {"id": "detector", "type": "FrameCounter", "parallelism": 2},
            {"id": "tracker", "type": "Passthrough", "parallelism": 2},
            {"id": "sink", "type": "FrameCounter", "config": {"stamp": true}}
        ],
        "connections": [
            {"from": "source", "to": "detector"},
            {"from": "source", "to": "tracker"},
            {"from": "detector", "to": "sink"},
            {"from": "tracker", "to": "sink"}
        ],
        "pipeline_config": {"name": "demo", "channel_capacity": 16, "profiling": true}
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("framegraph demo");
    println!("===============\n");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            println!("Loading pipeline from {}", path);
            PipelineConfig::from_file(path)?
        }
        None => PipelineConfig::from_json(demo_config())?,
    };

    let registry = ModuleRegistry::with_builtin();
    let pipeline = Pipeline::build(config, &registry).await?;
    println!("Heads: {:?}", pipeline.heads());
    println!("Tails: {:?}\n", pipeline.tails());

    pipeline.set_frame_done_callback(|frame| {
        println!("  frame of {} completed", frame.stream_id());
    });
    pipeline.start().await?;

    let heads: Vec<String> = pipeline.heads().iter().map(|h| h.to_string()).collect();
    for stream_id in STREAMS {
        for _ in 0..FRAMES_PER_STREAM {
            for head in &heads {
                let frame = Frame::create(pipeline.streams(), stream_id, false, None)?;
                pipeline.submit(head, frame).await?;
            }
        }
    }
    for stream_id in STREAMS {
        let eos = Frame::create(pipeline.streams(), stream_id, true, None)?;
        pipeline.submit(&heads[0], eos).await?;
    }

    for stream_id in STREAMS {
        let reached = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.wait_stream_eos_async(stream_id),
        )
        .await
        .unwrap_or(false);
        println!("\nStream {} end of stream reached: {}", stream_id, reached);
    }

    pipeline.stop().await?;

    while let Some(event) = pipeline.event_bus().try_poll_event() {
        match event.event_type {
            EventType::EndOfStream => println!(
                "Event: end of stream {}",
                event.stream_id.as_deref().unwrap_or("?")
            ),
            _ => println!("Event: {:?} from {}: {}", event.event_type, event.module_name, event.message),
        }
    }

    if let Some(report) = pipeline.report() {
        println!("\n{}", report);
    }

    Ok(())
}
