use tracing_subscriber::EnvFilter;
use wordgram_core::model::tokenize;
use wordgram_core::LanguageModel;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=wordgram_core=debug shows every interpolation step
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Contexts of up to 2 words (trigrams)
    let mut model = LanguageModel::new(3)?;

    // Each statement is counted as a whole, with all its prefixes
    for statement in [
        "I am a super hero",
        "She is not stupid clever",
        "She is stupid",
        "She is stupid but clever",
        "She is x but stupid",
        "She is smart stupid but clever",
        "She is x stupid but clever",
        "She is y stupid but clever",
        "She may be stupid but clever",
        "is y dont know but clever",
        "is stupid but who",
    ] {
        model.train(statement, 1);
    }

    // Raw counts
    let counter = model.counter();
    println!("count(She is) = {}", counter.count(&tokenize("She is")));
    println!("count(She is stupid) = {}", counter.count(&tokenize("She is stupid")));
    println!("count(Unseen Words) = {}", counter.count(&tokenize("Unseen Words")));

    // Smoothed conditional estimates, falling back to 1/15 without evidence
    let sequence = tokenize("She is stupid");
    for end in 1..=sequence.len() {
        println!(
            "P({} | {}) = {:.4}",
            sequence[end - 1],
            sequence[..end - 1].join(" "),
            model.conditional_estimate(&sequence, 0, end)?
        );
    }

    // Ranked next words (log-domain scores, higher is better)
    let context = tokenize("She is");
    for (word, score) in model.most_probable(&context)? {
        println!("She is {word}: {score:.4}");
    }

    // Asking for the continuations of an unseen context is an error
    match model.most_probable(&tokenize("He is")) {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("{e}"),
    }

    println!("Generated: She is {}", model.generate(&context, 5).join(" "));

    // Snapshot round trip
    let path = std::env::temp_dir().join("wordgram-demo.bin");
    model.save_to_file(&path)?;
    let restored = LanguageModel::load_from_file(&path)?;
    println!("Restored model identical: {}", restored == model);

    Ok(())
}
