//! Minimal cut sets of a small pressure-tank fault tree.
//!
//! The classic toy system: the tank ruptures if the tank itself fails, or
//! if the relief path and the control path fail together while either
//! sensor misreads.

use clap::Parser;

use fta_rs::model::{BasicEvent, Formula, Gate};
use fta_rs::{BooleanGraph, Mocus, Operator, Preprocessor, Settings};

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Maximum cut set order.
    #[clap(long, value_name = "INT", default_value = "8")]
    limit_order: usize,

    /// Print the graph in its shorthand form.
    #[clap(long)]
    dump: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();

    let tank = BasicEvent::new("tank-rupture");
    let relief_valve = BasicEvent::new("relief-valve-stuck");
    let relief_line = BasicEvent::new("relief-line-blocked");
    let controller = BasicEvent::new("controller-failure");
    let sensor_a = BasicEvent::new("pressure-sensor-a");
    let sensor_b = BasicEvent::new("pressure-sensor-b");

    let mut relief = Formula::new(Operator::Or);
    relief.add_basic_event(&relief_valve);
    relief.add_basic_event(&relief_line);

    let mut sensors = Formula::new(Operator::Or);
    sensors.add_basic_event(&sensor_a);
    sensors.add_basic_event(&sensor_b);

    let mut control = Formula::new(Operator::And);
    control.add_basic_event(&controller);
    control.add_formula(sensors);

    let mut overpressure = Formula::new(Operator::And);
    overpressure.add_formula(relief);
    overpressure.add_formula(control);

    let mut top = Formula::new(Operator::Or);
    top.add_basic_event(&tank);
    top.add_formula(overpressure);
    let top = Gate::new("tank-rupture-top", top);

    let time_total = std::time::Instant::now();

    let mut graph = BooleanGraph::new(&top, false)?;
    Preprocessor::new(&mut graph).run();
    if args.dump {
        println!("{}", graph);
    }

    let settings = Settings::new().with_limit_order(args.limit_order)?;
    let mut mocus = Mocus::new(&graph, settings);
    mocus.analyze();

    println!("minimal cut sets ({}):", mocus.products().len());
    for product in mocus.products() {
        let names: Vec<String> = product
            .iter()
            .map(|&literal| {
                let name = graph.get_basic_event(literal.abs()).id();
                if literal < 0 {
                    format!("not {}", name)
                } else {
                    name.to_string()
                }
            })
            .collect();
        println!("  {{{}}}", names.join(", "));
    }
    if mocus.truncated() {
        println!("(truncated beyond order {})", settings.limit_order());
    }

    println!("total time = {:?}", time_total.elapsed());
    Ok(())
}
