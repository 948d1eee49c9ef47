fn main() -> anyhow::Result<()> {
    slive_bench::cli::execute()
}
