use clap::Parser;

use crate::internal::orchestrator::Orchestrator;

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Command to run, with or without the leading program name
    #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub words: Vec<String>,
}

/// Bring the execution unit up, run one command and print its output.
///
/// Fails with the displayed message when the unit cannot be initialized or
/// the command does not succeed.
pub async fn execute(args: RunArgs, orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let readiness = orchestrator.initialize().await;
    if !readiness.ready {
        anyhow::bail!(readiness.message);
    }

    let line = join_words(&args.words)?;
    let outcome = orchestrator.execute(&line).await;
    if !outcome.is_success() {
        anyhow::bail!(outcome.display);
    }
    println!("{}", outcome.display);
    Ok(())
}

/// Re-join words split by the invoking shell into one command line that
/// tokenizes back into the same words.
///
/// A word containing a space or a quote character is wrapped in the quote
/// character it does not contain. The tokenizer has no escapes, so a word with
/// both quote characters cannot be represented and is rejected.
pub fn join_words(words: &[String]) -> anyhow::Result<String> {
    let quoted = words
        .iter()
        .map(|word| {
            let special = |c: char| c == ' ' || c == '\'' || c == '"';
            if !word.is_empty() && !word.contains(special) {
                Ok(word.clone())
            } else if !word.contains('"') {
                Ok(format!("\"{word}\""))
            } else if !word.contains('\'') {
                Ok(format!("'{word}'"))
            } else {
                anyhow::bail!("cannot pass an argument containing both ' and \": {word}")
            }
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(quoted.join(" "))
}
