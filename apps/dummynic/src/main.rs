// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use env_logger::Target;
use structopt::StructOpt;

use runtime::{Arguments, LoopbackTransport, Runner, Runtime, TimedEvent};

mod nic;

fn main() {
    let args = Arguments::from_args();

    env_logger::builder()
        .filter(Some("runtime"), log::LevelFilter::Debug)
        .filter(Some("dummynic"), log::LevelFilter::Debug)
        .target(Target::Stderr)
        .init();

    let params = args.into_params();
    let mut transport = LoopbackTransport::new(64);
    transport.set_echo_frames(true);
    let mut runner = Runner::new(nic::ScratchNic::default(), transport);

    // Kick off the heartbeat; the device reschedules it from then on.
    let heartbeat = TimedEvent::shared(
        params.start_tick + nic::HEARTBEAT_PERIOD,
        nic::TAG_HEARTBEAT,
    );
    runner.runtime().event_schedule(heartbeat);

    if let Err(err) = runner.run(&params) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
