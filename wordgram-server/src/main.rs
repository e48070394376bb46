//! HTTP surface over a single shared word n-gram model.
//!
//! ## Usage
//!
//! ```bash
//! # Order-3 model on 127.0.0.1:5000, snapshots in ./data
//! wordgram-server
//!
//! # Restore ./data/news.bin at startup
//! wordgram-server --load news --port 8080
//! ```

use std::path::PathBuf;
use std::sync::RwLock;

use actix_cors::Cors;
use actix_web::{get, post, put, web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wordgram_core::io::{list_snapshots, snapshot_path};
use wordgram_core::model::tokenize;
use wordgram_core::{LanguageModel, ModelConfig, ModelError};

#[derive(Parser, Debug)]
#[command(name = "wordgram-server")]
#[command(version)]
#[command(about = "Word n-gram language model server", long_about = None)]
struct Args {
	/// Host to bind to
	#[arg(long, default_value = "127.0.0.1")]
	host: String,

	/// Port to listen on
	#[arg(short, long, default_value = "5000")]
	port: u16,

	/// Directory holding model snapshots
	#[arg(long, default_value = "./data")]
	data_dir: PathBuf,

	/// N-gram order of a fresh model
	#[arg(short = 'n', long, default_value = "3")]
	ngram_order: usize,

	/// Smoothing strength (defaults to the n-gram order)
	#[arg(long)]
	lambda_factor: Option<f64>,

	/// Assumed sequence length, sets the uniform floor to 1/length
	#[arg(long, default_value = "15")]
	sequence_length: usize,

	/// Snapshot name to restore at startup instead of starting empty
	#[arg(long)]
	load: Option<String>,

	/// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
	#[arg(long, default_value = "info")]
	log_level: String,
}

impl Args {
	fn model_config(&self) -> ModelConfig {
		ModelConfig {
			ngram_order: self.ngram_order,
			lambda_factor: self.lambda_factor,
			sequence_length: self.sequence_length,
		}
	}
}

struct SharedData {
	model: RwLock<LanguageModel>,
	data_dir: PathBuf,
}

/// Query parameters for `/v1/train`.
#[derive(Deserialize)]
struct TrainParams {
	increment: Option<u64>,
	/// Count every window of up to N words instead of whole statements.
	windows: Option<bool>,
}

#[derive(Deserialize)]
struct ProbabilityParams {
	context: Option<String>,
	word: String,
}

/// A space-separated word sequence.
#[derive(Deserialize)]
struct SequenceParams {
	sequence: String,
}

#[derive(Deserialize)]
struct RankParams {
	context: String,
	limit: Option<usize>,
}

#[derive(Deserialize)]
struct GenerateParams {
	seed: Option<String>,
	max_words: Option<usize>,
}

#[derive(Deserialize)]
struct ModelQuery {
	name: Option<String>,
}

/// Maps a model error to a status: caller mistakes are 4xx, the rest 500.
fn error_response(e: ModelError) -> HttpResponse {
	match &e {
		ModelError::PathNotFound(_) => HttpResponse::NotFound().body(e.to_string()),
		ModelError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
			HttpResponse::NotFound().body(e.to_string())
		}
		_ if e.is_bounds_violation() => HttpResponse::BadRequest().body(e.to_string()),
		ModelError::InvalidArgument(_) | ModelError::Config(_) => HttpResponse::BadRequest().body(e.to_string()),
		_ => {
			error!(error = %e, "request failed");
			HttpResponse::InternalServerError().body(e.to_string())
		}
	}
}

fn lock_failed() -> HttpResponse {
	HttpResponse::InternalServerError().body("Model lock failed")
}

fn model_name(query: &ModelQuery) -> Result<&str, HttpResponse> {
	match &query.name {
		Some(s) if !s.trim().is_empty() => Ok(s.trim()),
		_ => Err(HttpResponse::BadRequest().body("Missing or empty model name")),
	}
}

/// Trains on the request body, one statement per line.
#[post("/v1/train")]
async fn post_train(data: web::Data<SharedData>, query: web::Query<TrainParams>, body: String) -> impl Responder {
	let increment = query.increment.unwrap_or(1);
	let windows = query.windows.unwrap_or(false);

	let mut model = match data.model.write() {
		Ok(m) => m,
		Err(_) => return lock_failed(),
	};

	let mut trained = 0usize;
	for line in body.lines() {
		let sequence = tokenize(line);
		if sequence.is_empty() {
			continue;
		}
		if windows {
			model.train_windows(&sequence, increment);
		} else {
			model.train_sequence(&sequence, increment);
		}
		trained += 1;
	}

	info!(trained, increment, windows, "trained statements");
	HttpResponse::Ok().body(format!("Trained {trained} statements"))
}

/// Log-domain score of `word` after `context`.
#[get("/v1/probability")]
async fn get_probability(data: web::Data<SharedData>, query: web::Query<ProbabilityParams>) -> impl Responder {
	let model = match data.model.read() {
		Ok(m) => m,
		Err(_) => return lock_failed(),
	};
	let context = tokenize(query.context.as_deref().unwrap_or(""));
	match model.probability(&context, query.word.trim()) {
		Ok(score) => HttpResponse::Ok().body(score.to_string()),
		Err(e) => error_response(e),
	}
}

/// Log-domain joint score of a whole sequence.
#[get("/v1/estimate")]
async fn get_estimate(data: web::Data<SharedData>, query: web::Query<SequenceParams>) -> impl Responder {
	let model = match data.model.read() {
		Ok(m) => m,
		Err(_) => return lock_failed(),
	};
	match model.mle_estimate(&tokenize(&query.sequence)) {
		Ok(score) => HttpResponse::Ok().body(score.to_string()),
		Err(e) => error_response(e),
	}
}

#[get("/v1/count")]
async fn get_count(data: web::Data<SharedData>, query: web::Query<SequenceParams>) -> impl Responder {
	let model = match data.model.read() {
		Ok(m) => m,
		Err(_) => return lock_failed(),
	};
	let count = model.counter().count(&tokenize(&query.sequence));
	HttpResponse::Ok().body(count.to_string())
}

/// Ranked next words, one `word\tscore` per line.
#[get("/v1/most_probable")]
async fn get_most_probable(data: web::Data<SharedData>, query: web::Query<RankParams>) -> impl Responder {
	let model = match data.model.read() {
		Ok(m) => m,
		Err(_) => return lock_failed(),
	};
	let context = tokenize(&query.context);
	let ranked = match query.limit {
		Some(limit) => model.most_probable_n(&context, limit),
		None => model.most_probable(&context),
	};
	match ranked {
		Ok(ranked) => {
			let lines: Vec<String> = ranked.iter().map(|(word, score)| format!("{word}\t{score}")).collect();
			HttpResponse::Ok().body(lines.join("\n"))
		}
		Err(e) => error_response(e),
	}
}

/// Samples a continuation of `seed`.
#[get("/v1/generate")]
async fn get_generated(data: web::Data<SharedData>, query: web::Query<GenerateParams>) -> impl Responder {
	let model = match data.model.read() {
		Ok(m) => m,
		Err(_) => return lock_failed(),
	};
	let seed = tokenize(query.seed.as_deref().unwrap_or(""));
	let generated = model.generate(&seed, query.max_words.unwrap_or(20));
	HttpResponse::Ok().body(generated.join(" "))
}

#[get("/v1/models")]
async fn get_models(data: web::Data<SharedData>) -> impl Responder {
	match list_snapshots(&data.data_dir) {
		Ok(names) => HttpResponse::Ok().body(names.join("\n")),
		Err(e) => error_response(e),
	}
}

#[put("/v1/save")]
async fn put_save(data: web::Data<SharedData>, query: web::Query<ModelQuery>) -> impl Responder {
	let name = match model_name(&query) {
		Ok(name) => name,
		Err(response) => return response,
	};
	let path = match snapshot_path(&data.data_dir, name) {
		Ok(path) => path,
		Err(e) => return error_response(e),
	};
	let model = match data.model.read() {
		Ok(m) => m,
		Err(_) => return lock_failed(),
	};
	match model.save_to_file(&path) {
		Ok(()) => HttpResponse::Ok().body("Model saved successfully"),
		Err(e) => error_response(e),
	}
}

/// Replaces the served model with a stored snapshot.
#[put("/v1/load")]
async fn put_load(data: web::Data<SharedData>, query: web::Query<ModelQuery>) -> impl Responder {
	let name = match model_name(&query) {
		Ok(name) => name,
		Err(response) => return response,
	};
	let loaded = match snapshot_path(&data.data_dir, name).and_then(LanguageModel::load_from_file) {
		Ok(model) => model,
		Err(e) => return error_response(e),
	};
	let mut model = match data.model.write() {
		Ok(m) => m,
		Err(_) => return lock_failed(),
	};
	*model = loaded;
	HttpResponse::Ok().body("Model loaded successfully")
}

fn routes(cfg: &mut web::ServiceConfig) {
	cfg.service(post_train)
		.service(get_probability)
		.service(get_estimate)
		.service(get_count)
		.service(get_most_probable)
		.service(get_generated)
		.service(get_models)
		.service(put_save)
		.service(put_load);
}

fn init_tracing(level: &str) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
	tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Main entry point for the server.
///
/// Builds (or restores) the model, wraps it in a `RwLock` so that
/// estimation requests run concurrently while training is exclusive, and
/// starts an Actix-web HTTP server.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	let args = Args::parse();
	init_tracing(&args.log_level);

	let model = match &args.load {
		Some(name) => snapshot_path(&args.data_dir, name).and_then(LanguageModel::load_from_file),
		None => LanguageModel::with_config(&args.model_config()),
	}
	.map_err(std::io::Error::other)?;

	info!(
		host = %args.host,
		port = args.port,
		ngram_order = model.ngram_order(),
		trained = model.is_trained(),
		"starting server"
	);

	let shared_data = web::Data::new(SharedData {
		model: RwLock::new(model),
		data_dir: args.data_dir.clone(),
	});

	HttpServer::new(move || {
		App::new()
			.wrap(Cors::permissive())
			.app_data(shared_data.clone())
			.configure(routes)
	})
		.bind((args.host.as_str(), args.port))?
		.run()
		.await
}
