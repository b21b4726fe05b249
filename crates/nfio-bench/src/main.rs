mod cli;
mod json_output;
mod report;
mod runner;

use clap::Parser;
use mpi::traits::*;
use tracing_subscriber::EnvFilter;

use nfio_mpi::MpiComm;

use cli::CliArgs;

fn main() {
    let universe = match mpi::initialize() {
        Some(u) => u,
        None => {
            eprintln!("ERROR: failed to initialize MPI");
            std::process::exit(1);
        }
    };
    let comm = MpiComm::new(universe.world());
    let world = comm.world();
    let rank = world.rank();
    let size = world.size();

    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let json_stdout = args.json;
    let json_file = args.json_file.clone();
    let json_mode = json_stdout || json_file.is_some();
    let print_text = !json_stdout;

    // Save command line for JSON output
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");

    // Every rank parses the same arguments, so a bad value fails all
    // ranks in lockstep with no messages in flight.
    let opts = match runner::resolve_opts(&args, size) {
        Ok(opts) => opts,
        Err(e) => {
            if rank == 0 {
                eprintln!("ERROR: {e}");
            }
            world.barrier();
            return;
        }
    };

    if rank == 0 && print_text {
        println!("nfio-bench");
        println!("  num_procs      = {}", size);
        println!("  nfiles         = {}", opts.nfiles);
        println!("  prefix         = {}", opts.prefix);
        println!("  grouping       = {:?}", opts.mode);
        println!("  dynamic        = {}", opts.dynamic);
        println!("  bytes_per_rank = {}", opts.bytes_per_rank);
        println!("  buffer_size    = {}", opts.buffer_size);
        println!("  ntimes         = {}", opts.ntimes);
        println!("  read_back      = {}", opts.read_back);
    }

    match runner::run(&comm, &opts, print_text) {
        Ok(results) => {
            if rank == 0 && json_mode {
                let doc = json_output::build_document(&opts, size, &results, &command_line);
                match serde_json::to_string_pretty(&doc) {
                    Ok(json_str) => {
                        if json_stdout {
                            println!("{}", json_str);
                        }
                        if let Some(ref path) = json_file {
                            if let Err(e) = std::fs::write(path, &json_str) {
                                eprintln!("ERROR: failed to write JSON file: {}", e);
                            }
                        }
                    }
                    Err(e) => eprintln!("ERROR: failed to serialize JSON: {}", e),
                }
            }
        }
        Err(e) => {
            eprintln!("ERROR [rank {}]: {}", rank, e);
            world.abort(1);
        }
    }

    // Synchronize all ranks before exit
    world.barrier();
    // MPI_Finalize happens on drop of `universe`
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
