use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // The startup log line carries the short SHA (VERGEN_GIT_SHA).
    use vergen::Emitter;
    use vergen_gitcl::Gitcl;

    Emitter::default()
        .add_instructions(&Gitcl::all_git())?
        .emit()?;

    Ok(())
}
