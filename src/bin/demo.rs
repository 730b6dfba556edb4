//! CLI demonstration of the public API: activate (if needed), then perform
//! one write, one read, or register one subscription and print notifications
//! as they arrive.
//!
//! Not part of the library; just a runnable illustration, same role as
//! `toad`'s own `examples/blocking/client.rs`.

use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use exosite_coap::std_pal::StdPal;
use exosite_coap::{Engine, Op, OperateStatus};

#[derive(Parser)]
#[command(name = "exosite-demo", about = "Exosite One Platform CoAP client demo")]
struct Cli {
  /// Vendor identifier assigned by Exosite.
  #[arg(long)]
  vendor: String,

  /// Device model identifier.
  #[arg(long)]
  model: String,

  /// Device serial number.
  #[arg(long)]
  serial: String,

  /// CoAP endpoint host.
  #[arg(long, default_value_t = exosite_coap::config::DEFAULT_HOST.to_string())]
  host: String,

  /// CoAP endpoint port.
  #[arg(long, default_value_t = exosite_coap::config::DEFAULT_PORT)]
  port: u16,

  /// Path to the file the CIK is persisted to.
  #[arg(long, default_value = "cik")]
  cik_path: String,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Write a value to a dataport alias.
  Write { alias: String, value: String },
  /// Read the current value of a dataport alias.
  Read { alias: String },
  /// Subscribe to a dataport alias and print notifications as they arrive.
  Subscribe { alias: String },
}

fn main() {
  simple_logger::init_with_level(log::Level::Info).unwrap();

  let cli = Cli::parse();
  let pal = StdPal::new(cli.host, cli.port, cli.cik_path);

  let mut engine = Engine::init(pal, &cli.vendor, &cli.model, &cli.serial).unwrap_or_else(|e| {
                                                                            log::error!("failed to initialize: {:?}", e);
                                                                            std::process::exit(1);
                                                                          });

  let mut value_buf = [0u8; 256];
  let mut ops: [Op; 2] = core::array::from_fn(|_| Op::default());

  match &cli.command {
    | Command::Write { alias, value } => {
      let len = value.len().min(value_buf.len());
      value_buf[..len].copy_from_slice(&value.as_bytes()[..len]);
      ops[1].write(alias, &mut value_buf, len);
    },
    | Command::Read { alias } => ops[1].read(alias, &mut value_buf),
    | Command::Subscribe { alias } => ops[1].subscribe(alias, &mut value_buf),
  }

  let is_subscribe = matches!(&cli.command, Command::Subscribe { .. });
  let mut last_reported_len = None;

  loop {
    let status = engine.operate(&mut ops);

    if ops[1].is_finished() {
      if ops[1].is_success() && ops[1].is_write() {
        log::info!("write ok");
      } else if ops[1].is_success() {
        log::info!("ok, value = {:?}", String::from_utf8_lossy(&value_buf[..ops[1].value_len]));
        last_reported_len = Some(ops[1].value_len);
      } else {
        log::error!("operation failed");
      }

      ops[1].done();
      if !is_subscribe {
        break;
      }
    } else if ops[1].state == exosite_coap::OpState::Subscribed
              && ops[1].value_len > 0
              && Some(ops[1].value_len) != last_reported_len
    {
      log::info!("notification: {:?}", String::from_utf8_lossy(&value_buf[..ops[1].value_len]));
      last_reported_len = Some(ops[1].value_len);
    }

    if status == OperateStatus::Idle {
      thread::sleep(Duration::from_millis(10));
    }
  }
}
