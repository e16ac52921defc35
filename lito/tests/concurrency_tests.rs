mod common;

use common::{error_message, run};

#[test]
fn wait_group_waits_for_every_spawned_block() {
    let source = "\
wg = WaitGroup.new
ch = Channel.new(3)
3.times { |i| wg.go(i) { |n|
  v = n * 10
  ch <- v
} }
wg.wait
ch.close
total = 0
ch.each { |v| total = total + v }
println(total)
";
    assert_eq!(run(source), "30\n");
}

#[test]
fn channel_each_drains_until_closed() {
    let source = "\
ch = Channel.new
go {
  [1, 2, 3].each { |n| ch <- n }
  ch.close
}
ch.each { |v| println(v) }
";
    assert_eq!(run(source), "1\n2\n3\n");
}

#[test]
fn buffered_channels_report_their_capacity() {
    assert_eq!(run("println(Channel.new(4).cap)\nprintln(Channel.new.cap)"), "4\n0\n");
}

#[test]
fn closed_channels_raise_on_use() {
    let closed = "ChannelCloseError: The channel is already closed.";
    assert_eq!(error_message("ch = Channel.new(1)\nch.close\nch <- 1"), closed);
    assert_eq!(error_message("ch = Channel.new(1)\nch.close\nch.receive"), closed);
    assert_eq!(error_message("ch = Channel.new(1)\nch.close\nch.close"), closed);
}

#[test]
fn channel_capacity_must_not_be_negative() {
    assert_eq!(
        error_message("Channel.new(-1)"),
        "ArgumentError: Expect argument to be positive value. got: -1"
    );
}

#[test]
fn wait_group_counter_cannot_go_below_zero() {
    assert_eq!(
        error_message("WaitGroup.new.done"),
        "ArgumentError: WaitGroup counter would become negative: -1"
    );
}

#[test]
fn lock_serialises_updates_from_many_threads() {
    let source = "\
require \"lock\"
lock = Lock.new
count = 0
wg = WaitGroup.new
20.times { wg.go { lock.lock { count = count + 1 } } }
wg.wait
println(count)
";
    assert_eq!(run(source), "20\n");
}

#[test]
fn lock_needs_to_be_required() {
    assert_eq!(
        error_message("Lock.new"),
        "NameError: uninitialized constant Lock"
    );
}

#[test]
fn spawned_blocks_may_start_with_an_array_literal() {
    let source = "\
ch = Channel.new
go {
  items = [4, 5]
  n = items.length
  ch <- n
}
println(ch.receive)
";
    assert_eq!(run(source), "2\n");
}

#[test]
fn wait_group_counts_down_even_when_the_block_raises() {
    let source = "\
wg = WaitGroup.new
wg.go { raise(\"x\") }
wg.wait
println(\"ok\")
";
    assert_eq!(run(source), "ok\n");
}

#[test]
fn errors_in_spawned_threads_stay_there() {
    let source = "\
ch = Channel.new
go { raise(\"boom\") }
go { ch <- 7 }
println(ch.receive)
";
    assert_eq!(run(source), "7\n");
}
