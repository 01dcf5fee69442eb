fn main() -> anyhow::Result<()> {
    mm::run()
}
