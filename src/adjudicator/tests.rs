use std::cell::RefCell;

use rand::{rngs::StdRng, Rng, SeedableRng};

use super::*;
use crate::bus::{Event, EventBus};
use crate::channel::{ConclusionProof, Params, State, TransitionRules};
use crate::clock::ManualClock;
use crate::encode::types::{ChannelId, EntityId, Signature, U256};
use crate::sig::Signer;

const START: u64 = 1_700_000_000;
const WINDOW: u64 = 60;

#[derive(Debug, Default)]
struct RecordingBus {
    events: RefCell<Vec<Event>>,
}

impl EventBus for RecordingBus {
    fn publish(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

struct Fixture {
    adj: Adjudicator<RecordingBus, ManualClock>,
    alice: Signer,
    bob: Signer,
    params: Params,
}

fn fixture() -> Fixture {
    // Do not use a seeded rng on any real device, this is just for testing.
    let mut rng = StdRng::seed_from_u64(0);
    let alice = Signer::new(&mut rng);
    let bob = Signer::new(&mut rng);
    let params = Params {
        origin: rng.gen(),
        nonce: rng.gen(),
        participants: [alice.address(), bob.address()],
        challenge_duration: WINDOW,
        rules: TransitionRules::Payment,
    };
    Fixture {
        adj: Adjudicator::new(RecordingBus::default(), ManualClock::new(START)),
        alice,
        bob,
        params,
    }
}

impl Fixture {
    fn channel(&self) -> ChannelId {
        self.params.channel_id().unwrap()
    }

    fn alice_key(&self) -> EntityId {
        EntityId::from(self.alice.address())
    }

    fn bob_key(&self) -> EntityId {
        EntityId::from(self.bob.address())
    }

    fn signer_for(&self, state: &State) -> &Signer {
        if state.mover() == self.alice.address() {
            &self.alice
        } else {
            &self.bob
        }
    }

    fn sign(&self, state: &State) -> Signature {
        self.signer_for(state).sign_eth(state.hash().unwrap())
    }

    /// The channel's state at `turn`, carrying the initial 6/4 resolution.
    fn state_at_turn(&self, turn: u64) -> State {
        let mut state = State::new(self.params, [U256::from(6), U256::from(4)]);
        for _ in 0..turn {
            state = state.make_next_state();
        }
        state
    }

    fn challenge_pair(&self, agreed_turn: u64) -> (State, State, [Signature; 2]) {
        let agreed = self.state_at_turn(agreed_turn);
        let challenge = agreed.make_next_state();
        let sigs = [self.sign(&agreed), self.sign(&challenge)];
        (agreed, challenge, sigs)
    }

    fn conclusion_proof(&self, penultimate_turn: u64) -> ConclusionProof {
        let penultimate = self.state_at_turn(penultimate_turn);
        let ultimate = penultimate.make_next_state();
        ConclusionProof {
            penultimate_sig: self.sign(&penultimate),
            ultimate_sig: self.sign(&ultimate),
            penultimate,
            ultimate,
        }
    }

    fn fund_channel(&mut self, amount: u64) {
        let destination = EntityId::from(self.channel());
        self.adj
            .deposit(destination, U256::from(amount), U256::from(amount))
            .unwrap();
    }

    fn withdrawal_sig(
        &self,
        signer: &Signer,
        receiver: EntityId,
        amount: U256,
        nonce: u64,
    ) -> Signature {
        let auth = WithdrawalAuth {
            participant: signer.address(),
            receiver,
            amount,
            nonce,
        };
        signer.sign_eth(auth.hash().unwrap())
    }

    fn events(&self) -> Vec<Event> {
        self.adj.bus.events.borrow().clone()
    }
}

#[test]
fn deposit_credits_destination() {
    let mut f = fixture();
    let destination = f.alice_key();

    f.adj
        .deposit(destination, U256::from(10), U256::from(10))
        .unwrap();

    assert_eq!(f.adj.allocation_of(destination), U256::from(10));
    assert_eq!(
        f.events(),
        vec![Event::Deposited {
            destination,
            amount: U256::from(10),
            holdings: U256::from(10),
        }]
    );
}

#[test]
fn deposit_rejects_amount_mismatch() {
    let mut f = fixture();
    let destination = f.alice_key();

    assert_eq!(
        f.adj.deposit(destination, U256::from(1), U256::from(2)),
        Err(DepositError::AmountMismatch {
            declared: U256::from(1),
            supplied: U256::from(2),
        })
    );
    assert_eq!(f.adj.allocation_of(destination), U256::from(0));
    assert!(f.events().is_empty());
}

#[test]
fn deposits_accumulate() {
    let mut f = fixture();
    let destination = f.alice_key();

    f.adj
        .deposit(destination, U256::from(10), U256::from(10))
        .unwrap();
    f.adj
        .deposit(destination, U256::from(5), U256::from(5))
        .unwrap();

    assert_eq!(f.adj.allocation_of(destination), U256::from(15));
}

#[test]
fn withdraw_moves_funds_and_bumps_nonce() {
    let mut f = fixture();
    let receiver = EntityId([0x99; 32]);
    f.adj
        .deposit(f.alice_key(), U256::from(10), U256::from(10))
        .unwrap();

    let sig = f.withdrawal_sig(&f.alice, receiver, U256::from(4), 0);
    f.adj
        .withdraw(f.alice.address(), receiver, U256::from(4), sig)
        .unwrap();

    assert_eq!(f.adj.allocation_of(f.alice_key()), U256::from(6));
    assert_eq!(f.adj.allocation_of(receiver), U256::from(4));
    assert_eq!(f.adj.withdrawal_nonce(f.alice.address()), 1);
}

#[test]
fn withdraw_rejects_replayed_signature() {
    let mut f = fixture();
    let receiver = EntityId([0x99; 32]);
    f.adj
        .deposit(f.alice_key(), U256::from(10), U256::from(10))
        .unwrap();

    let sig = f.withdrawal_sig(&f.alice, receiver, U256::from(4), 0);
    f.adj
        .withdraw(f.alice.address(), receiver, U256::from(4), sig)
        .unwrap();

    // The nonce moved, so the same signature no longer matches the message.
    let replay = f.adj.withdraw(f.alice.address(), receiver, U256::from(4), sig);
    assert!(matches!(replay, Err(WithdrawError::NotAuthorized { .. })));
    assert_eq!(f.adj.allocation_of(f.alice_key()), U256::from(6));
    assert_eq!(f.adj.withdrawal_nonce(f.alice.address()), 1);
}

#[test]
fn withdraw_rejects_wrong_signer() {
    let mut f = fixture();
    let receiver = EntityId([0x99; 32]);
    f.adj
        .deposit(f.alice_key(), U256::from(10), U256::from(10))
        .unwrap();

    // Bob signs an authorization naming Alice as the participant.
    let auth = WithdrawalAuth {
        participant: f.alice.address(),
        receiver,
        amount: U256::from(4),
        nonce: 0,
    };
    let sig = f.bob.sign_eth(auth.hash().unwrap());

    let result = f.adj.withdraw(f.alice.address(), receiver, U256::from(4), sig);
    match result {
        Err(WithdrawError::NotAuthorized {
            participant,
            recovered,
        }) => {
            assert_eq!(participant, f.alice.address());
            assert_eq!(recovered, f.bob.address());
        }
        other => panic!("expected NotAuthorized, got {other:?}"),
    }
    assert_eq!(f.adj.allocation_of(f.alice_key()), U256::from(10));
    assert_eq!(f.adj.withdrawal_nonce(f.alice.address()), 0);
}

#[test]
fn withdraw_rejects_overdraw_regardless_of_signature() {
    let mut f = fixture();
    let receiver = EntityId([0x99; 32]);
    f.adj
        .deposit(f.alice_key(), U256::from(3), U256::from(3))
        .unwrap();

    let sig = f.withdrawal_sig(&f.alice, receiver, U256::from(5), 0);
    let result = f.adj.withdraw(f.alice.address(), receiver, U256::from(5), sig);

    assert!(matches!(
        result,
        Err(WithdrawError::Overdrawn { available, requested })
            if available == U256::from(3) && requested == U256::from(5)
    ));
    assert_eq!(f.adj.allocation_of(f.alice_key()), U256::from(3));
    assert_eq!(f.adj.withdrawal_nonce(f.alice.address()), 0);
}

#[test]
fn force_move_opens_challenge() {
    let mut f = fixture();
    let channel = f.channel();
    let (agreed, challenge, sigs) = f.challenge_pair(6);

    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();

    assert_eq!(f.adj.channel_mode(channel), ChannelMode::Challenged);
    assert!(!f.adj.outcome_final(channel));
    assert!(!f.adj.is_channel_closed(channel));

    let outcome = f.adj.get_outcome(channel).unwrap();
    assert_eq!(outcome.finalized_at, START + WINDOW);
    assert_eq!(outcome.destinations, vec![f.alice_key(), f.bob_key()]);
    assert_eq!(outcome.amounts, vec![U256::from(6), U256::from(4)]);
    assert_eq!(outcome.challenge_state.as_ref(), Some(&challenge));

    assert_eq!(
        f.events(),
        vec![Event::ChallengeRegistered {
            channel,
            turn_num: 7,
            finalizes_at: START + WINDOW,
        }]
    );
}

#[test]
fn challenge_finalizes_exactly_when_the_window_elapses() {
    let mut f = fixture();
    let channel = f.channel();
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();

    f.adj.clock().set(START + WINDOW - 1);
    assert!(!f.adj.outcome_final(channel));
    assert_eq!(f.adj.channel_mode(channel), ChannelMode::Challenged);

    f.adj.clock().set(START + WINDOW);
    assert!(f.adj.outcome_final(channel));
    assert!(f.adj.is_channel_closed(channel));
    assert_eq!(f.adj.channel_mode(channel), ChannelMode::Closed);
}

#[test]
fn force_move_rejects_unless_channel_open() {
    let mut f = fixture();
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();

    let (agreed2, challenge2, sigs2) = f.challenge_pair(8);
    assert!(matches!(
        f.adj.force_move(&agreed2, &challenge2, &sigs2),
        Err(ForceMoveError::ChannelNotOpen {
            mode: ChannelMode::Challenged
        })
    ));

    f.adj.clock().advance(WINDOW);
    assert!(matches!(
        f.adj.force_move(&agreed2, &challenge2, &sigs2),
        Err(ForceMoveError::ChannelNotOpen {
            mode: ChannelMode::Closed
        })
    ));
}

#[test]
fn force_move_rejects_turn_gap() {
    let mut f = fixture();
    let agreed = f.state_at_turn(6);
    let challenge = agreed.make_next_state().make_next_state();
    let sigs = [f.sign(&agreed), f.sign(&challenge)];

    assert!(matches!(
        f.adj.force_move(&agreed, &challenge, &sigs),
        Err(ForceMoveError::InvalidTransition(_))
    ));
    assert_eq!(f.adj.get_outcome(f.channel()), None);
}

#[test]
fn force_move_rejects_unconserved_resolution() {
    let mut f = fixture();
    let agreed = f.state_at_turn(6);
    let mut challenge = agreed.make_next_state();
    challenge.resolution = [U256::from(6), U256::from(5)];
    let sigs = [f.sign(&agreed), f.sign(&challenge)];

    assert!(matches!(
        f.adj.force_move(&agreed, &challenge, &sigs),
        Err(ForceMoveError::InvalidTransition(_))
    ));
}

#[test]
fn force_move_rejects_swapped_signatures() {
    let mut f = fixture();
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    let swapped = [sigs[1], sigs[0]];

    assert!(matches!(
        f.adj.force_move(&agreed, &challenge, &swapped),
        Err(ForceMoveError::ChallengeNotAuthorized { .. })
    ));
    assert_eq!(f.adj.get_outcome(f.channel()), None);
}

#[test]
fn force_move_rejects_challenge_signed_by_wrong_participant() {
    let mut f = fixture();
    let agreed = f.state_at_turn(6);
    let challenge = agreed.make_next_state();
    // The agreed mover signs both states; the challenge needs the other
    // participant.
    let impostor_addr = agreed.mover();
    let sigs = {
        let impostor = f.signer_for(&agreed);
        [
            impostor.sign_eth(agreed.hash().unwrap()),
            impostor.sign_eth(challenge.hash().unwrap()),
        ]
    };

    match f.adj.force_move(&agreed, &challenge, &sigs) {
        Err(ForceMoveError::ChallengeNotAuthorized {
            expected,
            recovered,
        }) => {
            assert_eq!(expected, challenge.mover());
            assert_eq!(recovered, impostor_addr);
        }
        other => panic!("expected ChallengeNotAuthorized, got {other:?}"),
    }
}

#[test]
fn respond_with_move_clears_the_challenge() {
    let mut f = fixture();
    let channel = f.channel();
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();

    let mut response = challenge.make_next_state();
    response.resolution = [U256::from(5), U256::from(5)];
    let sig = f.sign(&response);
    f.adj.respond_with_move(&response, sig).unwrap();

    assert_eq!(f.adj.channel_mode(channel), ChannelMode::Open);
    assert!(!f.adj.outcome_final(channel));
    assert_eq!(f.adj.get_outcome(channel), Some(&Outcome::default()));

    // The channel is open again, so a fresh challenge may start.
    let (agreed2, challenge2, sigs2) = f.challenge_pair(8);
    f.adj.force_move(&agreed2, &challenge2, &sigs2).unwrap();
}

#[test]
fn respond_with_move_rejects_after_expiry() {
    let mut f = fixture();
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();
    f.adj.clock().advance(WINDOW);

    let response = challenge.make_next_state();
    let sig = f.sign(&response);

    assert!(matches!(
        f.adj.respond_with_move(&response, sig),
        Err(RespondError::ChallengeExpired {
            finalized_at,
            now,
        }) if finalized_at == START + WINDOW && now == START + WINDOW
    ));
}

#[test]
fn respond_with_move_rejects_without_pending_challenge() {
    let mut f = fixture();
    let response = f.state_at_turn(7);
    let sig = f.sign(&response);

    assert!(matches!(
        f.adj.respond_with_move(&response, sig),
        Err(RespondError::ChallengeNotPending)
    ));
}

#[test]
fn respond_with_move_rejects_wrong_signer() {
    let mut f = fixture();
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();

    let response = challenge.make_next_state();
    // Signed by the challenge mover instead of the response mover.
    let wrong = f.signer_for(&challenge).sign_eth(response.hash().unwrap());

    assert!(matches!(
        f.adj.respond_with_move(&response, wrong),
        Err(RespondError::ResponseNotAuthorized { .. })
    ));
    assert_eq!(f.adj.channel_mode(f.channel()), ChannelMode::Challenged);
}

#[test]
fn conclude_finalizes_immediately() {
    let mut f = fixture();
    let channel = f.channel();
    let proof = f.conclusion_proof(4);

    f.adj.conclude(&proof).unwrap();

    assert_eq!(f.adj.channel_mode(channel), ChannelMode::Closed);
    assert!(f.adj.outcome_final(channel));

    let outcome = f.adj.get_outcome(channel).unwrap();
    assert_eq!(outcome.finalized_at, START);
    assert_eq!(outcome.amounts, vec![U256::from(6), U256::from(4)]);
    assert_eq!(outcome.challenge_state.as_ref(), Some(&proof.penultimate));

    assert_eq!(
        f.events(),
        vec![Event::Concluded {
            channel,
            finalized_at: START,
        }]
    );
}

#[test]
fn conclude_rejects_a_finalized_channel() {
    let mut f = fixture();
    let proof = f.conclusion_proof(4);
    f.adj.conclude(&proof).unwrap();

    assert!(matches!(
        f.adj.conclude(&proof),
        Err(ConcludeError::AlreadyFinalized)
    ));
}

#[test]
fn conclude_overrides_a_pending_challenge() {
    let mut f = fixture();
    let channel = f.channel();
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();

    let proof = f.conclusion_proof(8);
    f.adj.conclude(&proof).unwrap();

    assert_eq!(f.adj.channel_mode(channel), ChannelMode::Closed);
    assert_eq!(f.adj.get_outcome(channel).unwrap().finalized_at, START);
}

#[test]
fn conclude_rejects_swapped_signatures() {
    let mut f = fixture();
    let mut proof = f.conclusion_proof(4);
    std::mem::swap(&mut proof.penultimate_sig, &mut proof.ultimate_sig);

    assert!(matches!(
        f.adj.conclude(&proof),
        Err(ConcludeError::ConclusionNotAuthorized { .. })
    ));
    assert_eq!(f.adj.get_outcome(f.channel()), None);
}

#[test]
fn conclude_rejects_gapped_proof() {
    let mut f = fixture();
    let penultimate = f.state_at_turn(4);
    let ultimate = penultimate.make_next_state().make_next_state();
    let proof = ConclusionProof {
        penultimate_sig: f.sign(&penultimate),
        ultimate_sig: f.sign(&ultimate),
        penultimate,
        ultimate,
    };

    assert!(matches!(
        f.adj.conclude(&proof),
        Err(ConcludeError::InvalidProof(_))
    ));
}

#[test]
fn transfer_rejects_without_outcome() {
    let mut f = fixture();
    let channel = f.channel();
    let alice_key = f.alice_key();

    assert_eq!(
        f.adj.transfer(channel, alice_key, U256::from(1)),
        Err(TransferError::OutcomeNotPresent)
    );
}

#[test]
fn transfer_rejects_while_the_window_runs() {
    let mut f = fixture();
    let channel = f.channel();
    f.fund_channel(10);
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();

    assert_eq!(
        f.adj.transfer(channel, f.alice_key(), U256::from(6)),
        Err(TransferError::OutcomeNotFinal {
            finalizes_at: START + WINDOW,
            now: START,
        })
    );
}

#[test]
fn transfer_pays_out_and_shrinks_the_outcome() {
    let mut f = fixture();
    let channel = f.channel();
    f.fund_channel(10);
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();
    f.adj.clock().advance(WINDOW);

    // Partial, then the rest; the recorded amount shrinks with each payout.
    f.adj.transfer(channel, f.alice_key(), U256::from(2)).unwrap();
    f.adj.transfer(channel, f.alice_key(), U256::from(4)).unwrap();

    assert_eq!(f.adj.allocation_of(f.alice_key()), U256::from(6));
    assert_eq!(f.adj.allocation_of(EntityId::from(channel)), U256::from(4));
    assert_eq!(
        f.adj.get_outcome(channel).unwrap().amounts,
        vec![U256::from(0), U256::from(4)]
    );

    // Alice's share is exhausted.
    assert_eq!(
        f.adj.transfer(channel, f.alice_key(), U256::from(1)),
        Err(TransferError::TransferTooLarge {
            recorded: U256::from(0),
            requested: U256::from(1),
        })
    );

    f.adj.transfer(channel, f.bob_key(), U256::from(4)).unwrap();
    assert_eq!(f.adj.allocation_of(f.bob_key()), U256::from(4));
    assert_eq!(f.adj.allocation_of(EntityId::from(channel)), U256::from(0));
}

#[test]
fn transfer_rejects_unknown_destination() {
    let mut f = fixture();
    let channel = f.channel();
    f.fund_channel(10);
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();
    f.adj.clock().advance(WINDOW);

    assert_eq!(
        f.adj.transfer(channel, EntityId([0x77; 32]), U256::from(1)),
        Err(TransferError::DestinationNotInOutcome)
    );
}

#[test]
fn transfer_rejects_underfunded_channel() {
    let mut f = fixture();
    let channel = f.channel();
    f.fund_channel(3);
    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();
    f.adj.clock().advance(WINDOW);

    assert_eq!(
        f.adj.transfer(channel, f.alice_key(), U256::from(6)),
        Err(TransferError::ChannelUnderfunded {
            held: U256::from(3),
            requested: U256::from(6),
        })
    );
}

#[test]
fn outcome_primitives_roundtrip() {
    let mut f = fixture();
    let channel = f.channel();

    assert_eq!(f.adj.get_outcome(channel), None);
    assert!(!f.adj.outcome_final(channel));

    let outcome = Outcome {
        destinations: vec![f.alice_key()],
        amounts: vec![U256::from(9)],
        finalized_at: START - 1,
        challenge_state: None,
    };
    f.adj.set_outcome(channel, outcome.clone());

    assert_eq!(f.adj.get_outcome(channel), Some(&outcome));
    assert!(f.adj.outcome_final(channel));

    // The zero sentinel means absent, never final.
    f.adj.set_outcome(channel, Outcome::default());
    assert!(!f.adj.outcome_final(channel));
}

#[test]
fn full_dispute_scenario() {
    let mut f = fixture();
    let channel = f.channel();
    f.fund_channel(255);

    let (agreed, challenge, sigs) = f.challenge_pair(6);
    f.adj.force_move(&agreed, &challenge, &sigs).unwrap();

    assert!(!f.adj.outcome_final(channel));
    assert_eq!(
        f.adj.transfer(channel, f.alice_key(), U256::from(6)),
        Err(TransferError::OutcomeNotFinal {
            finalizes_at: START + WINDOW,
            now: START,
        })
    );

    f.adj.clock().advance(WINDOW);
    assert!(f.adj.outcome_final(channel));

    f.adj.transfer(channel, f.alice_key(), U256::from(6)).unwrap();
    f.adj.transfer(channel, f.bob_key(), U256::from(4)).unwrap();

    assert_eq!(f.adj.allocation_of(f.alice_key()), U256::from(6));
    assert_eq!(f.adj.allocation_of(f.bob_key()), U256::from(4));
    assert_eq!(
        f.adj.allocation_of(EntityId::from(channel)),
        U256::from(255 - 10)
    );
}
