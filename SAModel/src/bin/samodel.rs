fn main() -> anyhow::Result<()> {
    samodel::cli::run_cli()
}
