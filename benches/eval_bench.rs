use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lispy::{Environment, eval_str, parse_all, tokenize};

const BENCH_INPUT: &str = r#"
(define fib (lambda (n)
  (if (< n 2)
      n
      (+ (fib (- n 1)) (fib (- n 2))))))

(define fact (lambda (n)
  (if (<= n 1)
      1
      (* n (fact (- n 1))))))

(define count (lambda (item L)
  (if (null? L) 0
      (+ (if (equal? item (car L)) 1 0) (count item (cdr L))))))

(count 0 (list 0 1 2 3 0 0))
(map fib (list 1 2 3 4 5 6 7 8))
(fact 20)
(* pi (* 10.5 10.5))
"#;

fn bench_front_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("Front end");

    group.bench_with_input(
        BenchmarkId::new("tokenize", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| tokenize(black_box(input))),
    );
    group.bench_with_input(
        BenchmarkId::new("parse_all", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| parse_all(black_box(input))),
    );

    group.finish();
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Evaluation");

    group.bench_function("program", |b| {
        b.iter(|| {
            let env = Environment::new_global_populated();
            eval_str(black_box(BENCH_INPUT), &env)
        })
    });

    for n in [10i64, 15] {
        group.bench_with_input(BenchmarkId::new("fib", n), &n, |b, &n| {
            let env = Environment::new_global_populated();
            let _ = eval_str(
                "(define fib (lambda (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))))",
                &env,
            );
            let call = format!("(fib {})", n);
            b.iter(|| eval_str(black_box(&call), &env))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_front_end, bench_evaluation);
criterion_main!(benches);
