use aws_mfaws::cli::Cli;
use clap::Parser;
use rstest::rstest;

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert()
}

#[test]
fn no_arguments() {
    let cli = Cli::parse_from(["mfaws", "--profile=default"]);
    assert_eq!(cli.profile, "default");
    let r = cli.validate_arguments();
    assert!(r.is_ok());
}

#[rstest]
#[case(&["--short-term-suffix=-long-term"], false)]
#[case(&["--long-term-suffix=", "--short-term-suffix="], false)]
#[case(&["--long-term-suffix=-lt", "--short-term-suffix=-st"], true)]
#[case(&["--assume-role=arn:aws:iam::123456789012:role/Example", "--duration=43200"], true)]
#[case(&["--assume-role=arn:aws:iam::123456789012:role/Example", "--duration=43201"], false)]
#[case(&["--duration=129600"], true)]
#[case(&["--profile= "], false)]
fn validate_arguments(#[case] args: &[&str], #[case] success: bool) {
    let mut argv = vec!["mfaws"];
    argv.extend_from_slice(args);
    let cli = Cli::parse_from(argv);
    let r = cli.validate_arguments();
    assert_eq!(r.is_ok(), success);
}
