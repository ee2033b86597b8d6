use std::error::Error;
use std::fs;
use std::path::Path;

use plotters::prelude::*;
use sim_lib::cpu::CPUPolicy;
use sim_lib::memory::cache::CachePolicy;
use sim_lib::run_wrapper::run;
use sim_lib::run_wrapper::RunStats;

const SET_COUNTS: [usize; 5] = [1, 2, 4, 8, 16];
const LINE_SIZES: [usize; 4] = [1, 2, 4, 8];
const WAYS: usize = 2;

fn main() -> Result<(), Box<dyn Error>> {
    let param_tokens: Vec<String> = std::env::args().collect();
    let binary = param_tokens
        .get(1)
        .ok_or("You should specify exactly one program image")?;
    let binary = Path::new(binary);
    let base_name = binary
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or("Program path has no file name")?;

    // Guard against programs that never halt
    let policy = CPUPolicy { max_cycles: Some(10_000_000), ..Default::default() };

    // One series per set count, varying the line size
    let mut data: Vec<Vec<(usize, RunStats)>> = vec![vec![]; SET_COUNTS.len()];
    for (i, sets) in SET_COUNTS.iter().enumerate() {
        for words_per_line in LINE_SIZES {
            let cache = CachePolicy::make(*sets, WAYS, words_per_line, 0);
            eprintln!("Running {} with {:?}", binary.display(), cache);
            let stats = run(binary, policy, cache)?;
            data[i].push((words_per_line, stats));
        }
    }

    fs::create_dir_all("eval")?;
    let csv_path = format!("eval/cache_eval_{}.csv", base_name);
    let mut writer = csv::Writer::from_path(&csv_path)?;
    writer.write_record([
        "Sets",
        "Words per line",
        "Cycles",
        "Instructions",
        "CPI",
        "Miss rate",
    ])?;
    for (i, sets) in SET_COUNTS.iter().enumerate() {
        for (words_per_line, stats) in &data[i] {
            writer.write_record([
                sets.to_string(),
                words_per_line.to_string(),
                stats.cycles.to_string(),
                stats.instructions.to_string(),
                format!("{:.3}", stats.cpi),
                format!("{:.4}", stats.miss_rate),
            ])?;
        }
    }
    writer.flush()?;

    // Plot cycles against line size
    let y_max = data
        .iter()
        .flatten()
        .map(|(_, stats)| stats.cycles)
        .max()
        .unwrap_or(1);
    let plot_title = format!("Cache geometry evaluation (cycles): {}", base_name);
    let svg_path = format!("eval/cache_eval_{}.svg", base_name);

    let root = SVGBackend::new(svg_path.as_str(), (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_max = LINE_SIZES[LINE_SIZES.len() - 1] as i32;
    let mut ctx = ChartBuilder::on(&root)
        .caption(plot_title.as_str(), ("sans-serif", 32).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(1..x_max, 0u64..y_max + y_max / 10)?;
    ctx.configure_mesh()
        .x_desc("Words per line")
        .y_desc("Cycles")
        .draw()?;

    for (i, sets) in SET_COUNTS.iter().enumerate() {
        let series = data[i].iter().map(|(x, stats)| (*x as i32, stats.cycles));
        let label = format!("Sets = {}", sets);
        let color = Palette99::pick(i).to_rgba();
        ctx.draw_series(LineSeries::new(series, color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;

    eprintln!("Wrote {} and {}", csv_path, svg_path);
    Ok(())
}
