use std::fs::File;
use std::io::{BufWriter, Read, Write};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use b2bssr::basic::ntrip::ntrip2ssr;
use b2bssr::basic::time::timestr_now;
use b2bssr::basic::var::Config;
use b2bssr::decode::B2bDecoder;
use b2bssr::ssr::emit::WriterSink;

#[derive(Parser, Debug)]
#[command(
    name = "b2bssr",
    about = "Decode BeiDou B2b PPP-SSR corrections from Septentrio SBF streams."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode an SBF File
    File {
        /// Input SBF File
        #[clap(short = 'i', long = "inp")]
        ifile: String,

        /// Output Corrections File (stdout if omitted)
        #[clap(short = 'o', long = "out")]
        ofile: Option<String>,

        /// Emission Cadence (s)
        #[clap(short = 'c', long = "cadence", default_value = "5.0")]
        cadence: f64,

        /// Ingest Combined Subtypes 6/7 (experimental)
        #[clap(long = "combined")]
        combined: bool,
    },

    /// Decode a Live NTRIP Stream
    Ntrip {
        /// NTRIP Server Hosting
        #[clap(short = 's', long = "host")]
        host: String,

        /// NTRIP Server Port
        #[clap(short = 'p', long = "port")]
        port: String,

        /// NTRIP Mountpoint
        #[clap(short = 'm', long = "mount")]
        mountpoint: String,

        /// Username
        #[clap(short = 'u', long = "user")]
        username: String,

        /// Password
        #[clap(short = 'w', long = "pass")]
        password: String,

        /// Emission Cadence (s)
        #[clap(short = 'c', long = "cadence", default_value = "5.0")]
        cadence: f64,
    },
}

fn decode_file(ifile: &str, ofile: Option<String>, cfg: Config) -> std::io::Result<()> {
    let mut file = File::open(ifile)?;
    let total = file.metadata()?.len();

    let mut out: Box<dyn Write> = match ofile {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };
    writeln!(out, "# b2bssr corrections from {} at {}", ifile, timestr_now())?;
    let mut sink = WriterSink { out };
    let mut decoder = B2bDecoder::new(cfg);

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut buf = vec![0u8; 4096];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        decoder.input(&buf[..n], &mut sink);
        pb.inc(n as u64);
    }
    pb.finish_with_message("done");

    let st = decoder.stats();
    info!(
        "decode summary: frames={} crc_err={} ldpc_ok={} ldpc_fail={} masks={} orbits={} clocks={}",
        st.frames, st.crc_errors, st.ldpc_ok, st.ldpc_fail, st.masks, st.orbits, st.clocks
    );
    if let Some(avg) = st.mean_ldpc_time() {
        info!("mean LDPC decode time: {:?}", avg);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::File {
            ifile,
            ofile,
            cadence,
            combined,
        } => {
            let cfg = Config {
                cadence,
                experimental_combined: combined,
                ..Config::default()
            };
            if let Err(e) = decode_file(&ifile, ofile, cfg) {
                eprintln!("decode failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Ntrip {
            host,
            port,
            mountpoint,
            username,
            password,
            cadence,
        } => {
            let cfg = Config {
                cadence,
                ..Config::default()
            };
            let mut sink = WriterSink {
                out: std::io::stdout(),
            };
            ntrip2ssr(
                &host,
                &port,
                &mountpoint,
                &username,
                &password,
                cfg,
                &mut sink,
            )
            .await;
        }
    }
}
