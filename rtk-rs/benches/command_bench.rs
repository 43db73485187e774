use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rtk::decode::{format_list, parse_list};
use rtk::options::{command, side, text, LEFT};
use rtk::{button, pack, Config, Session};

fn make_list(n: usize) -> String {
    let items: Vec<String> = (0..n).map(|i| format!("item {i} {{nested}}")).collect();
    format_list(&items)
}

fn bench_build(c: &mut Criterion) {
    let mut g = c.benchmark_group("command_build");

    // Record-only session: commands are assembled and dropped, never run.
    let session = Session::headless(Config { evaluate: false, ..Config::default() })
        .expect("headless session");
    Session::install(session);

    g.bench_function("button_with_options", |b| {
        b.iter(|| {
            drop(
                button(black_box(".b"))
                    - text(black_box("Press \"me\" [now]"))
                    - command("::rtk::callback1"),
            )
        })
    });
    g.bench_function("pack_chain", |b| {
        b.iter(|| drop(pack(black_box(".b")) - side(LEFT)))
    });

    g.finish();
}

fn bench_decode(c: &mut Criterion) {
    let small = make_list(10);
    let med = make_list(1_000);

    let mut g = c.benchmark_group("list_decode");
    g.bench_function("parse_small", |b| b.iter(|| parse_list(black_box(&small))));
    g.bench_function("parse_med", |b| b.iter(|| parse_list(black_box(&med))));
    g.finish();
}

fn bench_eval(c: &mut Criterion) {
    let session = Session::headless(Config::default()).expect("headless session");

    let mut g = c.benchmark_group("headless_eval");
    g.bench_function("expr_int", |b| {
        b.iter(|| session.expr(black_box("expr {6 * 7}")).int())
    });
    g.finish();
}

criterion_group!(benches, bench_build, bench_decode, bench_eval);
criterion_main!(benches);
